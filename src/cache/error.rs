use thiserror::Error;

/// Failures surfaced by the cache engine.
///
/// The display strings of `NotFound` and `EntryTooLarge` are part of the wire
/// contract and must not change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("not found")]
    NotFound,

    #[error("the entry size will exceed if you set this entry")]
    EntryTooLarge,

    #[error("invalid cache options: {0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
