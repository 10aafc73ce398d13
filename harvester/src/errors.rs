use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Session start failed: {0}")]
    SessionStart(String),

    #[error("No locator strategy matched for '{0}'")]
    LocatorExhausted(String),

    #[error("Phase timed out: {0}")]
    PhaseTimeout(String),

    #[error("Download timed out: {0}")]
    DownloadTimeout(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Invalid name pattern: {0}")]
    Pattern(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
