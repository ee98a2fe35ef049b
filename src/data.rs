//! The `Data` payload: a typed, attributed buffer plus its agent chain.

use crate::agent::AgentChain;
use crate::error::{CdpError, CdpResult};
use crate::ident::Dt;

/// Bytes held inline inside `Payload::Value` before we'd need a heap buffer.
/// Chosen so `Payload` stays small for the common scalar-value case (the tic
/// counter, short strings, small records).
pub const INLINE_CAP: usize = 24;

/// Opaque handle into library-owned state, for `Handle`/`Stream` payloads.
/// The caller's responsibility to keep the referent alive, per spec.md §5.
pub type LibraryHandle = u64;

/// Marker for which out-of-scope attribute header set a `Data`/`Store`'s
/// `attribute` word would be interpreted against (spec.md §1). CascadeDP
/// treats the word itself as opaque and never branches on this enum
/// internally; it exists only so a caller can tag which external header a
/// given attribute word belongs to without the core having to parse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeDomain {
    Binary,
    Text,
    Multimedia,
    Interface,
    Virtual,
    Rendering,
    Body,
    Physics,
    Shape,
}

/// The four storage shapes a `Data` payload can take.
pub enum Payload {
    /// Inline buffer, capped at `INLINE_CAP` bytes.
    Value { buf: [u8; INLINE_CAP], len: usize },
    /// Heap buffer with an optional destructor run once, from `Drop`.
    Data {
        buf: Vec<u8>,
        destructor: Option<Box<dyn FnOnce(&mut Vec<u8>)>>,
    },
    /// Opaque library resource id.
    Handle(LibraryHandle),
    /// Windowed view into a library-owned stream.
    Stream {
        library: LibraryHandle,
        offset: usize,
        len: usize,
    },
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value { buf, len } => f
                .debug_struct("Value")
                .field("bytes", &&buf[..*len])
                .finish(),
            Self::Data { buf, .. } => f.debug_struct("Data").field("len", &buf.len()).finish(),
            Self::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
            Self::Stream {
                library,
                offset,
                len,
            } => f
                .debug_struct("Stream")
                .field("library", library)
                .field("offset", offset)
                .field("len", len)
                .finish(),
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Self::Data { buf, destructor } = self {
            if let Some(destructor) = destructor.take() {
                destructor(buf);
            }
        }
    }
}

/// A typed payload owned by a [`crate::record::Record`]: encoding, domain
/// attributes, size/capacity bookkeeping, an optional chain of equivalent
/// encodings, and the agent chain dispatched for Data-level actions.
#[derive(Debug)]
pub struct Data {
    pub dt: Dt,
    pub attribute: u32,
    pub encoding: Dt,
    pub capacity: usize,
    pub writable: bool,
    pub locked: bool,
    pub hash: u64,
    pub next: Option<Box<Data>>,
    pub agents: AgentChain,
    payload: Payload,
}

impl Data {
    /// Allocates a new `Data`. For `Payload::Value` the buffer lives inline
    /// and `capacity` may not exceed [`INLINE_CAP`]; for `Payload::Data` a
    /// heap buffer of `capacity` bytes is allocated and `value` (if given)
    /// is copied into it, per spec.md §4.2.
    pub fn new_value(dt: Dt, encoding: Dt, attribute: u32, value: &[u8]) -> CdpResult<Self> {
        if value.len() > INLINE_CAP {
            return Err(CdpError::OutOfMemory);
        }
        let mut buf = [0u8; INLINE_CAP];
        buf[..value.len()].copy_from_slice(value);
        let mut data = Self {
            dt,
            attribute,
            encoding,
            capacity: INLINE_CAP,
            writable: true,
            locked: false,
            hash: 0,
            next: None,
            agents: AgentChain::new(),
            payload: Payload::Value {
                buf,
                len: value.len(),
            },
        };
        data.rehash();
        Ok(data)
    }

    pub fn new_heap(
        dt: Dt,
        encoding: Dt,
        attribute: u32,
        capacity: usize,
        value: Option<&[u8]>,
        destructor: Option<Box<dyn FnOnce(&mut Vec<u8>)>>,
    ) -> Self {
        let mut buf = vec![0u8; capacity];
        if let Some(value) = value {
            let n = value.len().min(capacity);
            buf[..n].copy_from_slice(&value[..n]);
        }
        let mut data = Self {
            dt,
            attribute,
            encoding,
            capacity,
            writable: true,
            locked: false,
            hash: 0,
            next: None,
            agents: AgentChain::new(),
            payload: Payload::Data { buf, destructor },
        };
        data.rehash();
        data
    }

    pub fn new_handle(dt: Dt, encoding: Dt, attribute: u32, handle: LibraryHandle) -> Self {
        Self {
            dt,
            attribute,
            encoding,
            capacity: 0,
            writable: true,
            locked: false,
            hash: 0,
            next: None,
            agents: AgentChain::new(),
            payload: Payload::Handle(handle),
        }
    }

    pub fn new_stream(
        dt: Dt,
        encoding: Dt,
        attribute: u32,
        library: LibraryHandle,
        offset: usize,
        len: usize,
    ) -> Self {
        Self {
            dt,
            attribute,
            encoding,
            capacity: len,
            writable: true,
            locked: false,
            hash: 0,
            next: None,
            agents: AgentChain::new(),
            payload: Payload::Stream {
                library,
                offset,
                len,
            },
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        match &self.payload {
            Payload::Value { len, .. } => *len,
            Payload::Data { buf, .. } => buf.len(),
            Payload::Handle(_) => 0,
            Payload::Stream { len, .. } => *len,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Value { buf, len } => Some(&buf[..*len]),
            Payload::Data { buf, .. } => Some(buf),
            Payload::Handle(_) | Payload::Stream { .. } => None,
        }
    }

    /// Updates the payload with `value`. If `capacity` exceeds the current
    /// one, reallocates for `Data` payloads (fails for `Value` if it would
    /// exceed the inline slot). When `swap` is true and the payload is
    /// `Data`, exchanges buffer ownership with `swap_buf` instead of copying.
    pub fn update(&mut self, value: &[u8], capacity: usize, swap_buf: Option<&mut Vec<u8>>) -> CdpResult<()> {
        if !self.writable {
            return Err(CdpError::ReadOnly);
        }
        if self.locked {
            return Err(CdpError::Locked);
        }
        match &mut self.payload {
            Payload::Value { buf, len } => {
                if capacity > INLINE_CAP || value.len() > INLINE_CAP {
                    return Err(CdpError::OutOfMemory);
                }
                buf[..value.len()].copy_from_slice(value);
                *len = value.len();
                self.capacity = INLINE_CAP;
            }
            Payload::Data {
                buf: existing,
                ..
            } => {
                if let Some(swap_buf) = swap_buf {
                    std::mem::swap(existing, swap_buf);
                } else {
                    if capacity > existing.len() {
                        existing.resize(capacity, 0);
                        self.capacity = capacity;
                    }
                    let n = value.len().min(existing.len());
                    existing[..n].copy_from_slice(&value[..n]);
                }
            }
            Payload::Handle(_) | Payload::Stream { .. } => return Err(CdpError::WrongRecordType),
        }
        self.rehash();
        Ok(())
    }

    pub fn add_agent(&mut self, dt: Dt, agent: Box<dyn crate::agent::Agent>) {
        self.agents.add(dt, agent);
    }

    /// Recomputes `self.hash` from the current payload bytes. `Handle`/
    /// `Stream` payloads hash as `0` since their bytes live outside this
    /// process (spec.md §3 treats `hash` as payload-derived, not identity).
    pub fn rehash(&mut self) {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        self.hash = match self.bytes() {
            Some(bytes) => {
                let mut hasher = DefaultHasher::new();
                bytes.hash(&mut hasher);
                hasher.finish()
            }
            None => 0,
        };
    }

    /// As a `u64`, for data known to hold a little-endian scalar (e.g. the
    /// step agent's tic counter).
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        let bytes = self.bytes()?;
        if bytes.len() < 8 {
            let mut padded = [0u8; 8];
            padded[..bytes.len()].copy_from_slice(bytes);
            return Some(u64::from_le_bytes(padded));
        }
        Some(u64::from_le_bytes(bytes[..8].try_into().ok()?))
    }

    pub fn set_u64(&mut self, value: u64) -> CdpResult<()> {
        self.update(&value.to_le_bytes(), 8, None)
    }
}
