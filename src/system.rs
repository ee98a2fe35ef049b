//! Process-wide root and lifecycle (spec.md §4.7): the standard directory
//! layout, the built-in step agent, and lazy/idempotent global startup.

use std::cell::RefCell;

use crate::agent::{self, Action, Agent, AgentContext, Registry, Status};
use crate::data::Data;
use crate::error::CdpResult;
use crate::ident::Dt;
use crate::record::{RecordType, Tree};
use crate::store::{AddContext, BackendKind, Indexing, Store, StoreExtra};

pub use crate::record::RecordId;

/// Sentinel meaning "no record", for APIs that need a plain `RecordId`
/// rather than `Option<RecordId>` (most of this crate prefers the latter;
/// this exists for parity with the original's void-pointer convention).
pub const CDP_VOID: RecordId = RecordId(usize::MAX);

impl RecordId {
    #[must_use]
    pub fn is_void(self) -> bool {
        self == CDP_VOID
    }
}

/// Tunables spec.md treats as constants, collected so they can be threaded
/// explicitly (teacher precedent: `BitStreamReader`/`BlockIter` take
/// `abbrev_width`/`block_id` as constructor arguments rather than reading
/// globals) instead of being buried in literals throughout the crate.
#[derive(Debug, Clone, Copy)]
pub struct CdpLimits {
    /// Bits available for a name payload below the 6 system-reserved bits;
    /// mirrors [`crate::ident::NAME_BITS`].
    pub name_bits: u32,
    /// Bits available to a Word/Acronym/Reference/Numeric id payload;
    /// mirrors [`crate::ident::AUTOID_BITS`].
    pub autoid_bits: u32,
    /// `deep_traverse`'s stack starts pre-sized to this many frames before
    /// it needs to grow onto the heap.
    pub small_stack_depth: usize,
    /// Octree subdivision stops once an octant's half-size drops below
    /// `parent_half_size / octree_epsilon_divisor`.
    pub octree_epsilon_divisor: f64,
    /// Ceiling `Store::new` checks a requested chunk/array capacity against
    /// before allocating, failing soft with `CdpError::OutOfMemory`.
    pub max_store_capacity: usize,
}

impl CdpLimits {
    pub const DEFAULT: CdpLimits = CdpLimits {
        name_bits: crate::ident::NAME_BITS,
        autoid_bits: crate::ident::AUTOID_BITS,
        small_stack_depth: 16,
        octree_epsilon_divisor: 1_048_576.0,
        max_store_capacity: 1 << 20,
    };
}

fn step_dt() -> Dt {
    Dt::words("system", "step").expect("static dt encodes")
}

/// The built-in step agent (spec.md §4.6): on `InstanceInitiate` it seeds
/// the tic counter; `InstanceConnect`/`InstanceUnplug` manage the record's
/// connected-links store; `DataUpdate` advances the tic and propagates to
/// every connected link in insertion order.
pub struct StepAgent;

impl Agent for StepAgent {
    fn call(&mut self, ctx: &mut AgentContext<'_>, action: Action, value: u64) -> Status {
        match action {
            Action::InstanceInitiate => Status::Success,
            Action::InstanceConnect => {
                let target = RecordId(value as usize);
                let dt = step_dt();
                let link = match ctx.tree.initialize_link(dt, target) {
                    Ok(id) => id,
                    Err(_) => return Status::Fail,
                };
                match ctx.tree.add(ctx.record, AddContext::Append, link) {
                    Ok(_) => Status::Success,
                    Err(_) => Status::Fail,
                }
            }
            Action::InstanceUnplug => {
                let link = RecordId(value as usize);
                match ctx.tree.remove(link, Some(())) {
                    Ok(_) => Status::Success,
                    Err(_) => Status::Fail,
                }
            }
            Action::DataUpdate => {
                let tic = ctx
                    .tree
                    .get(ctx.record)
                    .ok()
                    .and_then(|r| r.data.as_ref())
                    .and_then(Data::as_u64)
                    .unwrap_or(0);
                if let Ok(rec) = ctx.tree.get_mut(ctx.record) {
                    if let Some(data) = rec.data.as_mut() {
                        let _ = data.set_u64(tic.wrapping_add(1));
                    }
                }
                if let Ok(links) = Store::order(ctx.tree, ctx.record) {
                    for link in links {
                        let target = ctx.tree.get(link).ok().and_then(|r| r.link);
                        if let Some(target) = target {
                            let _ = agent::dispatch_data(ctx.tree, ctx.record, target, Action::DataUpdate, value);
                        }
                    }
                }
                Status::Success
            }
            _ => Status::Success,
        }
    }
}

fn mkdir(tree: &mut Tree, parent: RecordId, tag: &str, kind: BackendKind, indexing: Indexing) -> CdpResult<RecordId> {
    let name = Dt::words("system", tag)?;
    let store = Store::new(name, 0, parent, kind, indexing, StoreExtra::None)?;
    let id = tree.initialize(RecordType::Normal, name, None, Some(store))?;
    tree.add(parent, AddContext::Append, id)
}

/// The process-wide record tree plus the bookkeeping `System::step` needs:
/// the standard directory layout and a running tic counter.
pub struct System {
    pub tree: Tree,
    pub registry: Registry,
    pub system: RecordId,
    pub domain: RecordId,
    pub library: RecordId,
    pub user: RecordId,
    pub public: RecordId,
    pub data: RecordId,
    pub network: RecordId,
    pub temp: RecordId,
    pub tic: u64,
}

impl System {
    pub fn startup() -> CdpResult<Self> {
        Self::startup_with(CdpLimits::DEFAULT)
    }

    /// Builds the standard `/system` (`/system/domain`, `/system/library`),
    /// `/user`, `/public`, `/data`, `/network`, `/temp` layout under a fresh
    /// root (spec.md §4.7). `limits` isn't threaded further yet — it exists
    /// so call sites can pick non-default tunables once a caller needs to,
    /// without changing this signature.
    pub fn startup_with(limits: CdpLimits) -> CdpResult<Self> {
        let _ = limits;
        let mut tree = Tree::new();
        let root = tree.root;
        // `/system` is array-backed (spec.md §4.7); `/system/domain`, `/user`,
        // `/public`, `/data`, `/network` are red-black dictionaries so name
        // uniqueness and sorted order are enforced by the backend itself;
        // `/temp` is the one plain linked list.
        let system = mkdir(&mut tree, root, "system", BackendKind::Array, Indexing::Insertion)?;
        let domain = mkdir(&mut tree, system, "domain", BackendKind::RedBlack, Indexing::ByName)?;
        let library = mkdir(&mut tree, system, "library", BackendKind::LinkedList, Indexing::Insertion)?;
        let user = mkdir(&mut tree, root, "user", BackendKind::RedBlack, Indexing::ByName)?;
        let public = mkdir(&mut tree, root, "public", BackendKind::RedBlack, Indexing::ByName)?;
        let data = mkdir(&mut tree, root, "data", BackendKind::RedBlack, Indexing::ByName)?;
        let network = mkdir(&mut tree, root, "network", BackendKind::RedBlack, Indexing::ByName)?;
        let temp = mkdir(&mut tree, root, "temp", BackendKind::LinkedList, Indexing::Insertion)?;
        Ok(Self {
            tree,
            registry: Registry::new(),
            system,
            domain,
            library,
            user,
            public,
            data,
            network,
            temp,
            tic: 0,
        })
    }

    /// Attaches a fresh step-agent-bound record under `parent`, seeded with
    /// an 8-byte tic counter and an insertion-ordered store for its
    /// connected links, and runs `InstanceInitiate` on it.
    pub fn make_step_record(&mut self, parent: RecordId, name: Dt) -> CdpResult<RecordId> {
        let store = Store::new(name, 0, parent, BackendKind::LinkedList, Indexing::Insertion, StoreExtra::None)?;
        let mut data = Data::new_value(name, name, 0, &0u64.to_le_bytes())?;
        data.add_agent(step_dt(), Box::new(StepAgent));
        let id = self.tree.initialize(RecordType::Normal, name, Some(data), Some(store))?;
        let id = self.tree.add(parent, AddContext::Append, id)?;
        self.registry.register(step_dt());
        self.tree.dispatch(id, Action::InstanceInitiate, 0)?;
        Ok(id)
    }

    /// Links `from` to `to` through the step agent's `InstanceConnect`.
    pub fn connect(&mut self, from: RecordId, to: RecordId) -> CdpResult<Status> {
        agent::dispatch_instance(&mut self.tree, from, from, Action::InstanceConnect, to.0 as u64)
    }

    /// Detaches the link record `link` (as returned by inspecting `from`'s
    /// store) through `InstanceUnplug`.
    pub fn unplug(&mut self, from: RecordId, link: RecordId) -> CdpResult<Status> {
        agent::dispatch_instance(&mut self.tree, from, from, Action::InstanceUnplug, link.0 as u64)
    }

    /// Feeds `value` into `record`'s inlet (`InstanceInlet`).
    pub fn inlet(&mut self, record: RecordId, value: u64) -> CdpResult<Status> {
        agent::dispatch_instance(&mut self.tree, record, record, Action::InstanceInlet, value)
    }

    /// Advances the global tic and dispatches `DataUpdate` to every direct
    /// child of `/data`, the runtime's reactive working area.
    pub fn step(&mut self) -> CdpResult<()> {
        self.tic = self.tic.wrapping_add(1);
        let data = self.data;
        for child in Store::order(&self.tree, data)? {
            agent::dispatch_data(&mut self.tree, child, child, Action::DataUpdate, self.tic)?;
        }
        Ok(())
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

thread_local! {
    static SYSTEM: RefCell<Option<System>> = const { RefCell::new(None) };
}

/// Runs `f` against the lazily-initialized global system, starting it up on
/// first use and reusing it thereafter (spec.md §4.7 "lazy+idempotent
/// init"). Single-threaded by design (spec.md §5): each thread gets its own
/// system rather than sharing one behind a lock.
pub fn with_system<R>(f: impl FnOnce(&mut System) -> CdpResult<R>) -> CdpResult<R> {
    SYSTEM.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(System::startup()?);
        }
        f(slot.as_mut().expect("system was just initialized"))
    })
}

/// Tears down this thread's global system, if one was ever started.
pub fn shutdown_global() {
    SYSTEM.with(|cell| {
        if let Some(system) = cell.borrow_mut().take() {
            system.shutdown();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_builds_standard_layout() {
        let system = System::startup().unwrap();
        for (parent, tag) in [
            (system.tree.root, "system"),
            (system.system, "domain"),
            (system.system, "library"),
            (system.tree.root, "user"),
            (system.tree.root, "public"),
            (system.tree.root, "data"),
            (system.tree.root, "network"),
            (system.tree.root, "temp"),
        ] {
            let name = Dt::words("system", tag).unwrap();
            assert!(system.tree.find_by_name(parent, name).unwrap().is_some());
        }
    }

    #[test]
    fn step_agent_advances_tic_and_propagates() {
        let mut system = System::startup().unwrap();
        let data = system.data;
        let source = system.make_step_record(data, Dt::words("t", "src").unwrap()).unwrap();
        let sink = system.make_step_record(data, Dt::words("t", "snk").unwrap()).unwrap();
        system.connect(source, sink).unwrap();

        system.step().unwrap();

        let source_tic = system.tree.get(source).unwrap().data.as_ref().unwrap().as_u64().unwrap();
        let sink_tic = system.tree.get(sink).unwrap().data.as_ref().unwrap().as_u64().unwrap();
        assert_eq!(source_tic, 1);
        assert_eq!(sink_tic, 1);
    }

    #[test]
    fn global_system_is_lazy_and_idempotent() {
        shutdown_global();
        let first_tic = with_system(|sys| Ok(sys.tic)).unwrap();
        assert_eq!(first_tic, 0);
        with_system(|sys| {
            sys.tic = 5;
            Ok(())
        })
        .unwrap();
        let second_tic = with_system(|sys| Ok(sys.tic)).unwrap();
        assert_eq!(second_tic, 5);
        shutdown_global();
    }
}
