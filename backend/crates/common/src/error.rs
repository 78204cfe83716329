use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// The source-of-record service rejected or failed a read or write.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OpsError {
    /// Errors that are expected to clear up on the next tick without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Upstream(_) | Self::Notification(_)
        )
    }

    /// The receiving side refused the request itself; sending it again unchanged cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

pub type OpsResult<T> = Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = OpsError::Upstream("HTTP 502".to_owned());
        assert_eq!(err.to_string(), "upstream error: HTTP 502");
    }

    #[test]
    fn transient_classification() {
        assert!(OpsError::Database("timeout".into()).is_transient());
        assert!(OpsError::Upstream("429".into()).is_transient());
        assert!(!OpsError::Config("missing".into()).is_transient());
        assert!(!OpsError::Validation("bad payload".into()).is_transient());
    }

    #[test]
    fn only_refused_requests_are_rejections() {
        assert!(OpsError::Validation("HTTP 400".into()).is_rejection());
        assert!(OpsError::NotFound("page".into()).is_rejection());
        assert!(!OpsError::Upstream("HTTP 503".into()).is_rejection());
        assert!(!OpsError::Config("bad token".into()).is_rejection());
        assert!(!OpsError::Database("timeout".into()).is_rejection());
    }
}
