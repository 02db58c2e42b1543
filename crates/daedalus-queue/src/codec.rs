//! Message codecs.
//!
//! A [`Codec`] turns a typed message into queue bytes and back. Two are
//! provided: [`JsonCodec`] over `serde_json` and [`ProstCodec`] over
//! protobuf messages.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{QueueError, QueueResult};

/// Converts between `T` and queue payload bytes.
pub trait Codec<T>: Send + Sync + 'static {
    /// Serializes `value`.
    fn encode(&self, value: &T) -> QueueResult<Vec<u8>>;

    /// Deserializes `bytes`.
    fn decode(&self, bytes: &[u8]) -> QueueResult<T>;
}

/// JSON codec.
///
/// # Example
///
/// ```rust
/// use daedalus_queue::{Codec, JsonCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Job {
///     id: u32,
/// }
///
/// let codec = JsonCodec::<Job>::new();
/// let bytes = codec.encode(&Job { id: 1 }).unwrap();
/// assert_eq!(bytes, br#"{"id":1}"#);
/// ```
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn encode(&self, value: &T) -> QueueResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(QueueError::encode)
    }

    fn decode(&self, bytes: &[u8]) -> QueueResult<T> {
        serde_json::from_slice(bytes).map_err(QueueError::decode)
    }
}

/// Protobuf codec.
///
/// Decoding merges the payload into a fresh message produced by the
/// constructor given to [`ProstCodec::new`].
pub struct ProstCodec<M> {
    make: Arc<dyn Fn() -> M + Send + Sync>,
}

impl<M> ProstCodec<M> {
    /// Creates a codec that decodes into messages built by `make`.
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
    {
        Self { make: Arc::new(make) }
    }
}

impl<M: Default + 'static> Default for ProstCodec<M> {
    fn default() -> Self {
        Self::new(M::default)
    }
}

impl<M> Clone for ProstCodec<M> {
    fn clone(&self) -> Self {
        Self {
            make: Arc::clone(&self.make),
        }
    }
}

impl<M> fmt::Debug for ProstCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProstCodec")
    }
}

impl<M> Codec<M> for ProstCodec<M>
where
    M: prost::Message + 'static,
{
    fn encode(&self, value: &M) -> QueueResult<Vec<u8>> {
        Ok(value.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> QueueResult<M> {
        let mut message = (self.make)();
        message.merge(bytes).map_err(QueueError::decode)?;
        Ok(message)
    }
}
