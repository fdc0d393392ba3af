#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A validated frame contained a field that could not be decoded.
    #[error("Invalid field: {0}")]
    Field(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
