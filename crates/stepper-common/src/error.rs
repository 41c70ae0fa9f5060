/// Errors raised by page implementations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Page not ready")]
    NotReady,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn is_not_supported(&self) -> bool {
        matches!(self, BackendError::NotSupported(_))
    }
}
