use crate::identity::IdentityToken;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Accessory with identity {0} is already registered")]
    DuplicateIdentity(IdentityToken),

    #[error("Unknown accessory: {0}")]
    UnknownAccessory(IdentityToken),

    #[error("Restore phase already completed")]
    RestoreAlreadyComplete,

    #[error("Discovery requested before the host finished restoring accessories")]
    RestoreNotComplete,

    #[error("Invalid accessory context: {0}")]
    InvalidContext(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sensor endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to decode sensor payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Reading out of range: {field} = {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
