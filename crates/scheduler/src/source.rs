//! Collaborator interfaces: key sequence, transport, decoder and the
//! presentation-layer sink.

use std::sync::Arc;

use crate::error::{DecodeError, FetchError};

/// Ordered, fixed sequence of resource identifiers indexed by position.
pub trait KeySequence: Send + Sync {
    fn len(&self) -> usize;

    /// Identifier at `index`, or `None` outside `[0, len)`
    fn key_at(&self, index: usize) -> Option<&str>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> KeySequence for Vec<S>
where
    S: AsRef<str> + Send + Sync,
{
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn key_at(&self, index: usize) -> Option<&str> {
        self.get(index).map(AsRef::as_ref)
    }
}

/// Synchronous byte fetcher, invoked on a background thread.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Turns fetched bytes into displayable content.
pub trait Decoder<V>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<V, DecodeError>;
}

/// Identity decoder: the fetched bytes are the content.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

impl Decoder<Vec<u8>> for RawBytes {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError("empty body".into()));
        }
        Ok(bytes.to_vec())
    }
}

/// Presentation-layer callback.
///
/// Called from whichever thread produced the content: the scheduler thread
/// for cache hits, a fetch thread for completed fetches. Implementations
/// marshal to their own presentation context and must tolerate out-of-order
/// arrival.
pub trait ContentSink<V>: Send + Sync {
    fn on_content_ready(&self, key: &str, content: Arc<V>);
}

impl<V, F> ContentSink<V> for F
where
    F: Fn(&str, Arc<V>) + Send + Sync,
{
    fn on_content_ready(&self, key: &str, content: Arc<V>) {
        self(key, content)
    }
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self(url)
    }
}
