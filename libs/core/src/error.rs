use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown scheme [{0}]")]
    UnknownScheme(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
