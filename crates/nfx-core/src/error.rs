//! Error types for NativeFX

use thiserror::Error;

/// Host status: call succeeded
pub const STATUS_OK: i32 = 0;
/// Host status: the request is not supported by this effect
pub const STATUS_UNSUPPORTED: i32 = 1;
/// Host status: any other failure
pub const STATUS_ERROR: i32 = 2;

/// Core error type
#[derive(Error, Debug)]
pub enum NfxError {
    #[error("Unsupported parameter index: {0}")]
    UnsupportedParameter(usize),

    #[error("Unknown float buffer: {0}")]
    UnknownBuffer(String),

    #[error("Invalid sample slot: {0}")]
    InvalidSlot(usize),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Invalid parameter definition: {0}")]
    InvalidParamDef(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl NfxError {
    /// Status integer reported back through the host callback
    pub fn status_code(&self) -> i32 {
        match self {
            NfxError::UnsupportedParameter(_) | NfxError::UnknownBuffer(_) => STATUS_UNSUPPORTED,
            _ => STATUS_ERROR,
        }
    }
}

/// Result type alias
pub type NfxResult<T> = Result<T, NfxError>;

/// Collapse a result into the host status integer
pub fn status_of<T>(result: &NfxResult<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}
