use std::{error, fmt};

/// Errors surfaced by the record engine.
///
/// Mirrors the taxonomy of kinds (not concrete types) rather than one
/// variant per call site; callers match on the variant they care about and
/// let the rest propagate with `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdpError {
    /// A Word/Acronym/Reference/Numeric name failed to encode or decode.
    InvalidName,
    /// A `Dt` pair failed validation (e.g. domain isn't a valid name).
    InvalidDt,
    /// Operation not supported by the store's backend.
    WrongBackend,
    /// Operation not supported by the store's indexing discipline.
    WrongIndexing,
    /// Record isn't the type the operation requires (e.g. `Link` where a
    /// data-bearing record was expected).
    WrongRecordType,
    /// A `ByName`/Red-Black/Octree store already holds this name.
    DuplicateKey,
    /// `pop`/`take`/`first`/`last` on a store with no children.
    EmptyStore,
    /// `finalize`/`remove` on a record still targeted by a link.
    HasShadows,
    /// Write attempted against `writable = false` data or store.
    ReadOnly,
    /// Write attempted against a `lock`-ed data or store.
    Locked,
    /// No agent registered for the given `(domain, tag)`.
    AgentMissing,
    /// A requested allocation would exceed a configured ceiling.
    OutOfMemory,
    /// A link was dereferenced after its target left the tree.
    LinkDangling,
    /// `finalize`/`remove`/`append` attempted on the root record.
    IsRoot,
    /// Lookup (`find_by_name`, `find_by_path`, ...) found nothing.
    NotFound,
    /// The autoid counter would exceed its 56-bit ceiling.
    AutoIdOverflow,
}

impl fmt::Display for CdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidName => "invalid name encoding",
            Self::InvalidDt => "invalid domain/tag pair",
            Self::WrongBackend => "operation incompatible with store backend",
            Self::WrongIndexing => "operation incompatible with store indexing",
            Self::WrongRecordType => "operation incompatible with record type",
            Self::DuplicateKey => "duplicate key in sorted store",
            Self::EmptyStore => "store has no children",
            Self::HasShadows => "record is still targeted by shadow links",
            Self::ReadOnly => "data or store is not writable",
            Self::Locked => "data or store is locked",
            Self::AgentMissing => "no agent registered for domain/tag",
            Self::OutOfMemory => "allocation would exceed configured limit",
            Self::LinkDangling => "link target is no longer in the tree",
            Self::IsRoot => "operation not valid on the root record",
            Self::NotFound => "record not found",
            Self::AutoIdOverflow => "autoid counter exhausted",
        })
    }
}

impl error::Error for CdpError {}

pub type CdpResult<T> = Result<T, CdpError>;
