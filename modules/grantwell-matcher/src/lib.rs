//! Multi-source grant matching (the read path).
//!
//! Given a project description, extract keywords, fan out to every grant
//! source at once, and merge what comes back into one ranked list. A source
//! that fails or times out is logged and excluded; the match never fails as
//! a whole.

pub mod keywords;
pub mod matcher;
pub mod sources;

pub use keywords::extract_keywords;
pub use matcher::GrantMatcher;
pub use sources::{GrantLead, GrantSource};
