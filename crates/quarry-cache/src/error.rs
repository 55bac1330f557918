pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache persistence.
///
/// Read paths deliberately do not use this type: a payload that cannot be
/// loaded is a cache miss, not an error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialize(#[from] quarry_index::SerializeError),
}
