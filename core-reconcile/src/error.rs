use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Remote catalog error: {0}")]
    Catalog(#[from] BridgeError),

    #[error("Upload run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
