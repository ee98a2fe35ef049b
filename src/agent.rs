//! Cascade dispatch: the closed action vocabulary, agent chains, and the
//! global `(domain, tag)` agent registry.
//!
//! The action set purposefully follows `cdp_system.c` (the latest of the
//! conflicting drafts in the original source) rather than the earlier
//! `cdp_action.*`/`cdp_signal.*` vocabulary — see spec.md Design Notes.

use std::collections::HashMap;
use std::fmt;

use log::Level;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{CdpError, CdpResult};
use crate::ident::Dt;
use crate::record::{Record, RecordId};

/// The closed set of actions an agent may be asked to handle.
///
/// `repr(u32)` plus `TryFromPrimitive`/`IntoPrimitive` mirror
/// `schema::enums`'s treatment of other closed wire vocabularies: spec.md §6
/// gives the external agent callback signature as `(... action: u32 ...)`, so
/// a call arriving from outside the tree (e.g. a registered agent invoked
/// through a raw FFI boundary) can round-trip through `u32` the same way a
/// bitcode record code round-trips through `TryFromPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Action {
    InstanceInitiate = 0,
    InstanceValidate = 1,
    InstanceInlet = 2,
    InstanceConnect = 3,
    InstanceUnplug = 4,
    InstanceClean = 5,
    DataNew = 6,
    DataUpdate = 7,
    DataDelete = 8,
    StoreNew = 9,
    StoreAddItem = 10,
    StoreRemoveItem = 11,
    StoreDelete = 12,
}

impl Action {
    /// Whether this action targets the Data chain first per dispatch policy
    /// (all "instance" composites prefer Data, falling back to Store).
    #[must_use]
    pub fn is_instance(self) -> bool {
        matches!(
            self,
            Self::InstanceInitiate
                | Self::InstanceValidate
                | Self::InstanceInlet
                | Self::InstanceConnect
                | Self::InstanceUnplug
                | Self::InstanceClean
        )
    }
}

/// Outcome of a single agent call. Ordered so "< Ok" is the short-circuit
/// test; `repr(i32)` matches spec.md §6's callback return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Status {
    Fail = -1,
    Progress = 0,
    Ok = 1,
    Success = 2,
}

impl Status {
    #[must_use]
    pub fn continues(self) -> bool {
        self >= Status::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    fn as_log_level(self) -> Level {
        match self {
            Self::Debug => Level::Debug,
            Self::Warning => Level::Warn,
            Self::Error | Self::Fatal => Level::Error,
        }
    }
}

/// Posts a structured log record the way `system_log` does in spec.md §7.
pub fn system_log(level: LogLevel, message: fmt::Arguments<'_>) {
    log::log!(level.as_log_level(), "{}", message);
    if level == LogLevel::Fatal {
        debug_assert!(false, "fatal cascade error: {message}");
    }
}

/// A mutable view handed to an agent for the duration of one dispatch call.
/// Agents reach the record tree only through this context, never by holding
/// their own reference to it, since the tree is owned elsewhere.
pub struct AgentContext<'a> {
    pub client: RecordId,
    pub record: RecordId,
    pub tree: &'a mut crate::record::Tree,
}

/// A user-registered handler for a `(domain, tag)` pair.
pub trait Agent {
    fn call(&mut self, ctx: &mut AgentContext<'_>, action: Action, value: u64) -> Status;
}

/// One entry in a Data or Store agent chain: the `(domain, tag)` that
/// selected this agent, paired with the agent itself. Chains are flat
/// vectors (Design Notes: "Dispatch chain of agents"), iterated
/// first-to-last, with removal by identity via `dt`.
pub struct AgentBinding {
    pub dt: Dt,
    pub agent: Box<dyn Agent>,
}

impl fmt::Debug for AgentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBinding").field("dt", &self.dt).finish()
    }
}

/// A flat, ordered chain of agents, owned by a `Data` or a `Store`.
#[derive(Debug, Default)]
pub struct AgentChain(Vec<AgentBinding>);

impl AgentChain {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, dt: Dt, agent: Box<dyn Agent>) {
        self.0.push(AgentBinding { dt, agent });
    }

    pub fn remove(&mut self, dt: Dt) -> bool {
        let before = self.0.len();
        self.0.retain(|b| b.dt != dt);
        self.0.len() != before
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dispatches `action` to each bound agent in order, stopping at the
    /// first status `< Ok`. A record keeps a `dispatched` scratch set so a
    /// single agent is never invoked twice for the same top-level call, per
    /// the "instance" composite's Data-then-Store fallback policy.
    pub fn dispatch(
        &mut self,
        ctx: &mut AgentContext<'_>,
        action: Action,
        value: u64,
        dispatched: &mut Vec<Dt>,
    ) -> Status {
        let mut last = Status::Success;
        for binding in &mut self.0 {
            if dispatched.contains(&binding.dt) {
                continue;
            }
            dispatched.push(binding.dt);
            last = binding.agent.call(ctx, action, value);
            if !last.continues() {
                system_log(
                    LogLevel::Warning,
                    format_args!("agent {:?} returned {:?} for {:?}", binding.dt, last, action),
                );
                return last;
            }
        }
        last
    }
}

/// Global registry mapping `(domain, tag)` to the agent responsible for
/// records carrying that Dt, per spec.md §4.6 ("Agents are registered in a
/// global (domain, tag) table"). Used by [`crate::system::System`] to know
/// which `(domain, tag)` pairs have a startup-time agent to invoke; the
/// actual per-record agent chains live on each `Record`'s `Data`/`Store`,
/// per spec.md's "records point at zero-or-more agents through the agent
/// chains inside Data and Store".
pub struct Registry {
    known: HashMap<(u64, u64), Dt>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            known: HashMap::new(),
        }
    }

    pub fn register(&mut self, dt: Dt) {
        self.known.insert((dt.domain.0, dt.tag.0), dt);
    }

    #[must_use]
    pub fn is_registered(&self, dt: Dt) -> bool {
        self.known.contains_key(&(dt.domain.0, dt.tag.0))
    }

    pub fn lookup(&self, dt: Dt) -> CdpResult<Dt> {
        self.known
            .get(&(dt.domain.0, dt.tag.0))
            .copied()
            .ok_or(CdpError::AgentMissing)
    }
}

/// Dispatches a composite "instance" action for `record`: prefer the Data
/// chain, fall back to the Store chain if Data has none bound.
pub fn dispatch_instance(
    tree: &mut crate::record::Tree,
    client: RecordId,
    record: RecordId,
    action: Action,
    value: u64,
) -> CdpResult<Status> {
    debug_assert!(action.is_instance());
    let mut dispatched = Vec::new();
    let has_data_agents = tree
        .get(record)?
        .data
        .as_ref()
        .map(|d| !d.agents.is_empty())
        .unwrap_or(false);

    if has_data_agents {
        let mut chain = std::mem::take(&mut tree.get_mut(record)?.data.as_mut().unwrap().agents);
        let mut ctx = AgentContext {
            client,
            record,
            tree,
        };
        let status = chain.dispatch(&mut ctx, action, value, &mut dispatched);
        tree.get_mut(record)?.data.as_mut().unwrap().agents = chain;
        return Ok(status);
    }

    let has_store_agents = tree
        .get(record)?
        .store
        .as_ref()
        .map(|s| !s.agents.is_empty())
        .unwrap_or(false);
    if has_store_agents {
        let mut chain = std::mem::take(&mut tree.get_mut(record)?.store.as_mut().unwrap().agents);
        let mut ctx = AgentContext {
            client,
            record,
            tree,
        };
        let status = chain.dispatch(&mut ctx, action, value, &mut dispatched);
        tree.get_mut(record)?.store.as_mut().unwrap().agents = chain;
        return Ok(status);
    }

    Ok(Status::Success)
}

/// Dispatches a Data-level action (e.g. `DataUpdate`) for `record`.
pub fn dispatch_data(
    tree: &mut crate::record::Tree,
    client: RecordId,
    record: RecordId,
    action: Action,
    value: u64,
) -> CdpResult<Status> {
    let mut dispatched = Vec::new();
    let mut chain = {
        let rec: &mut Record = tree.get_mut(record)?;
        match rec.data.as_mut() {
            Some(data) => std::mem::take(&mut data.agents),
            None => return Ok(Status::Success),
        }
    };
    let mut ctx = AgentContext {
        client,
        record,
        tree,
    };
    let status = chain.dispatch(&mut ctx, action, value, &mut dispatched);
    tree.get_mut(record)?.data.as_mut().unwrap().agents = chain;
    Ok(status)
}

/// Dispatches a Store-level action (e.g. `StoreAddItem`) for `record`.
pub fn dispatch_store(
    tree: &mut crate::record::Tree,
    client: RecordId,
    record: RecordId,
    action: Action,
    value: u64,
) -> CdpResult<Status> {
    let mut dispatched = Vec::new();
    let mut chain = {
        let rec: &mut Record = tree.get_mut(record)?;
        match rec.store.as_mut() {
            Some(store) => std::mem::take(&mut store.agents),
            None => return Ok(Status::Success),
        }
    };
    let mut ctx = AgentContext {
        client,
        record,
        tree,
    };
    let status = chain.dispatch(&mut ctx, action, value, &mut dispatched);
    tree.get_mut(record)?.store.as_mut().unwrap().agents = chain;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Tree;

    #[test]
    fn action_round_trips_through_u32() {
        for action in [Action::InstanceInitiate, Action::DataUpdate, Action::StoreDelete] {
            let raw: u32 = action.into();
            assert_eq!(Action::try_from(raw).unwrap(), action);
        }
    }

    #[test]
    fn status_round_trips_through_i32_and_orders_by_severity() {
        assert!(Status::Fail < Status::Ok);
        assert!(Status::Progress < Status::Ok);
        assert!(Status::Success >= Status::Ok);
        let raw: i32 = Status::Fail.into();
        assert_eq!(Status::try_from(raw).unwrap(), Status::Fail);
    }

    struct CountingAgent(std::rc::Rc<std::cell::Cell<u32>>, Status);

    impl Agent for CountingAgent {
        fn call(&mut self, _ctx: &mut AgentContext<'_>, _action: Action, _value: u64) -> Status {
            self.0.set(self.0.get() + 1);
            self.1
        }
    }

    #[test]
    fn chain_short_circuits_on_first_failure() {
        let mut tree = Tree::new();
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut chain = AgentChain::new();
        chain.add(Dt::words("t", "a").unwrap(), Box::new(CountingAgent(calls.clone(), Status::Fail)));
        chain.add(Dt::words("t", "b").unwrap(), Box::new(CountingAgent(calls.clone(), Status::Success)));
        let root = tree.root;
        let mut ctx = AgentContext {
            client: root,
            record: root,
            tree: &mut tree,
        };
        let mut dispatched = Vec::new();
        let status = chain.dispatch(&mut ctx, Action::DataUpdate, 0, &mut dispatched);
        assert_eq!(status, Status::Fail);
        assert_eq!(calls.get(), 1, "second agent must not run after a < Ok status");
    }
}
