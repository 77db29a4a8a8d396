use thiserror::Error;

#[derive(Debug, Error)]
pub enum MolError {
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(String),
    #[error("selection error: {0}")]
    Selection(String),
    #[error("property error: {0}")]
    Property(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Invalid(String),
}

pub type MolResult<T> = Result<T, MolError>;
