//! Resource types, decoders and shared handles

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use uuid::Uuid;

use crate::Result;
use crate::locator::{FileInfo, StreamInfo};

/// Unique identity of one decoded resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type that can be built from a located byte source
///
/// `from_file` is tried first for plain files; returning `Ok(None)` falls
/// back to `from_stream`, which every type must support.
pub trait Resource: Sized + Send + Sync + 'static {
    /// Build from direct file access
    fn from_file(info: &FileInfo) -> Result<Option<Self>> {
        let _ = info;
        Ok(None)
    }

    /// Build from a forward-only stream
    fn from_stream(info: StreamInfo) -> Result<Self>;
}

/// A decoding strategy producing one resource type
///
/// Unlike [`Resource`], a decoder carries state, e.g. a codec setting or a
/// test counter.
pub trait ResourceDecoder {
    /// Type produced by this decoder
    type Output: Send + Sync + 'static;

    /// Decode from direct file access, `Ok(None)` falls back to the stream path
    fn decode_file(&self, info: &FileInfo) -> Result<Option<Self::Output>> {
        let _ = info;
        Ok(None)
    }

    /// Decode from a forward-only stream
    fn decode_stream(&self, info: StreamInfo) -> Result<Self::Output>;
}

/// Decoder delegating to a type's [`Resource`] implementation
pub struct TypeDecoder<T>(PhantomData<fn() -> T>);

impl<T> TypeDecoder<T> {
    /// Create the decoder
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypeDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypeDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDecoder<{}>", std::any::type_name::<T>())
    }
}

impl<T: Resource> ResourceDecoder for TypeDecoder<T> {
    type Output = T;

    fn decode_file(&self, info: &FileInfo) -> Result<Option<T>> {
        T::from_file(info)
    }

    fn decode_stream(&self, info: StreamInfo) -> Result<T> {
        T::from_stream(info)
    }
}

/// A decoded resource as handed out by the cache
///
/// Handles are shared through `Arc`; the value lives as long as the last
/// handle, whether or not the cache still tracks it.
#[derive(Debug)]
pub struct Loaded<T> {
    id: ResourceId,
    source: String,
    value: T,
}

impl<T> Loaded<T> {
    pub(crate) fn new(source: String, value: T) -> Self {
        Self {
            id: ResourceId::new(),
            source,
            value,
        }
    }

    /// Identity of this instance
    pub fn resource_id(&self) -> ResourceId {
        self.id
    }

    /// Canonical id of the locator it was built from
    pub fn source_id(&self) -> &str {
        &self.source
    }

    /// The decoded value
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Raw bytes of a resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(Vec<u8>);

impl Blob {
    /// Wrap bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Borrow the bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Resource for Blob {
    fn from_file(info: &FileInfo) -> Result<Option<Self>> {
        Ok(Some(Self(info.read_all()?)))
    }

    fn from_stream(info: StreamInfo) -> Result<Self> {
        Ok(Self(info.read_all()?))
    }
}
