//! Error taxonomy for demand loading.
//!
//! None of these errors is fatal to the scheduler or the cache: fetch and
//! decode failures end only their own task, and an index error skips only the
//! offending position.

/// Retrieving raw bytes failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Raw bytes could not be turned into displayable content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not decode image: {0}")]
pub struct DecodeError(pub String);

/// The scheduler was asked for a position outside the key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("index {index} out of range for {len} keys")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

/// Why a fetch task ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
