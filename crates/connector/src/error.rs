use qcache_context::Interrupted;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DialError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Dialer rejected {instance}: {reason}")]
    Rejected { instance: String, reason: String },
    #[error("Dialer closed")]
    Closed,
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Failed to build dialer: {0}")]
    Configuration(#[source] BoxError),
    #[error("Credentials file {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("Connector closed")]
    Closed,
}
