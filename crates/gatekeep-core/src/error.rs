use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid tag format: {0}")]
    InvalidTagFormat(String),

    #[error("Invalid access direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid device status: {0}")]
    InvalidDeviceStatus(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
