use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserPoolError>;

#[derive(Debug, Error)]
pub enum BrowserPoolError {
    /// The pool had no free browser to hand out.
    #[error("No free browser in the pool")]
    PoolExhausted,

    /// The session no longer exists pool-side: it expired or the pool
    /// reclaimed its browser. Callers should open a fresh session rather
    /// than retry the call.
    #[error("Browser session {session_id} is gone")]
    SessionGone { session_id: String },

    /// The pool call itself timed out. Gesture plans pause in the browser,
    /// so this usually means a plan ran past the client timeout, not that
    /// the pool is down.
    #[error("Pool call timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Pool API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl BrowserPoolError {
    /// Classify a non-success pool response. `session_id` is set for calls
    /// scoped to an existing session, where a 404 means the session itself
    /// is gone rather than a bad route.
    pub(crate) fn from_response(status: u16, message: String, session_id: Option<&str>) -> Self {
        match (status, session_id) {
            (404, Some(id)) => BrowserPoolError::SessionGone {
                session_id: id.to_string(),
            },
            (503, _) => BrowserPoolError::PoolExhausted,
            _ => BrowserPoolError::Api { status, message },
        }
    }

    /// Whether opening a new session could succeed where this call failed.
    pub fn is_recoverable_with_new_session(&self) -> bool {
        matches!(self, BrowserPoolError::SessionGone { .. })
    }
}

impl From<reqwest::Error> for BrowserPoolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserPoolError::Timeout(err.to_string())
        } else {
            BrowserPoolError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_scoped_404_means_the_session_is_gone() {
        let err = BrowserPoolError::from_response(404, "not found".to_string(), Some("abc123"));
        assert!(matches!(
            &err,
            BrowserPoolError::SessionGone { session_id } if session_id.as_str() == "abc123"
        ));
        assert!(err.is_recoverable_with_new_session());
    }

    #[test]
    fn unscoped_404_stays_a_plain_api_error() {
        let err = BrowserPoolError::from_response(404, "not found".to_string(), None);
        assert!(matches!(err, BrowserPoolError::Api { status: 404, .. }));
        assert!(!err.is_recoverable_with_new_session());
    }

    #[test]
    fn a_busy_pool_is_its_own_error() {
        let err = BrowserPoolError::from_response(503, "no browsers".to_string(), Some("abc123"));
        assert!(matches!(err, BrowserPoolError::PoolExhausted));
    }

    #[test]
    fn other_statuses_keep_their_code_and_body() {
        let err = BrowserPoolError::from_response(500, "boom".to_string(), Some("abc123"));
        match err {
            BrowserPoolError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
