use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("token request failed: {0}")]
    Token(String),
    #[error("join failed: {0}")]
    Join(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("background processing failed: {0}")]
    Processing(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("session error: {0}")]
    Session(String),
}

impl CallError {
    /// Fatal errors move a joining session to `Failed`; the rest only
    /// surface a transient notice.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CallError::Permission(_) | CallError::Token(_) | CallError::Join(_) | CallError::Publish(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_errors_are_fatal() {
        assert!(CallError::Permission("camera".into()).is_fatal());
        assert!(CallError::Token("503".into()).is_fatal());
        assert!(CallError::Join("refused".into()).is_fatal());
        assert!(CallError::Publish("closed".into()).is_fatal());
    }

    #[test]
    fn control_errors_are_recoverable() {
        assert!(!CallError::Processing("unsupported".into()).is_fatal());
        assert!(!CallError::Device("single camera".into()).is_fatal());
        assert!(!CallError::Session("not joined".into()).is_fatal());
    }
}
