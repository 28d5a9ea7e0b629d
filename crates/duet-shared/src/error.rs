use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
