//! CascadeDP: a hierarchical in-memory record engine.
//!
//! Every value the engine manages is a [`record::Record`] in a single arena-backed
//! tree, named by a [`ident::Dt`] domain/tag pair and optionally carrying a
//! [`data::Data`] payload, a [`store::Store`] of children, or both. Children are held
//! in one of five interchangeable ordering backends (linked list, dynamic array,
//! packed queue, red-black tree, octree); record-to-record references beyond the
//! tree shape itself go through `Link` records and shadow sets rather than raw
//! pointers. [`agent::Agent`] chains hang off Data and Store to react to lifecycle
//! and mutation actions, and [`system::System`] wires up the standard root layout
//! (`/system`, `/data`, `/network`, `/temp`, ...) plus the startup/tic/shutdown
//! cascade.

/// The closed action/status vocabulary and agent dispatch chains.
pub mod agent;
/// Payload storage: inline values, heap buffers, library handles and streams.
pub mod data;
/// The `CdpError`/`CdpResult` error taxonomy.
pub mod error;
/// Domain-tagged 64-bit identifiers (`Id`/`Dt`) and their encodings.
pub mod ident;
/// The record arena: allocation, the record algebra, shadows, traversal entry points.
pub mod record;
/// The five child-ordering backends behind a shared `Store` contract.
pub mod store;
/// Standard root layout, startup/tic/shutdown, and the global `System` singleton.
pub mod system;
/// Iterative shallow and deep traversal over the record tree.
pub mod traverse;

pub use self::agent::{Action, Agent, AgentChain, AgentContext, Status};
pub use self::data::Data;
pub use self::error::{CdpError, CdpResult};
pub use self::ident::{Dt, Id};
pub use self::record::{Record, RecordId, RecordType, Tree};
pub use self::store::{AddContext, Backend, BackendKind, CompareFn, Indexing, OctreeBound, Store, StoreExtra};
pub use self::system::{CdpLimits, System};
