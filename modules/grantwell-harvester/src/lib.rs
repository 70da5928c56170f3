//! Paced grant harvester.
//!
//! Scrapes a grant portal the way a person browses it: a few short sessions
//! a day at irregular times, with reading pauses, gesture noise, and hard
//! daily limits. The pieces:
//!
//! - [`behavior`]: pacing and disguise decisions (delays, breaks, headers)
//! - [`extract`]: CSS-selector extraction of grant listings
//! - [`portal`]: browser-pool-backed portal access behind a trait
//! - [`session`]: one scraping session from start record to terminal status
//! - [`schedule`]: day planning and the long-running scheduler loop
//! - [`service`]: control facade shared by the API and the headless runner

pub mod behavior;
pub mod extract;
pub mod portal;
pub mod schedule;
pub mod service;
pub mod session;

pub use service::{HarvestError, HarvestStatus, HarvesterService, Progress, SchedulerAction};
pub use session::{EngineConfig, PortalCredentials, SessionEngine, SessionOptions, SessionStats};
