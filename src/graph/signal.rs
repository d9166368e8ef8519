//! Signal subscriptions and emission policies.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use compact_str::CompactString;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use super::tree::NodeId;

new_key_type! { pub struct SubscriptionId; }

/// Type-erased handler body. The receiver is the target node's behavior.
pub type HandlerFn = Rc<dyn Fn(&mut dyn Any)>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectPolicy {
    /// Synchronous invocation in emission order.
    #[default]
    Normal,
    /// Queued, runs once at the next `flush_deferred`.
    Deferred,
    /// Synchronous, subscription removed after the first invocation.
    OneShot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    SourceMissing,
    TargetMissing,
    UnknownSignal(CompactString),
    AlreadyConnected,
    NotConnected,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::SourceMissing => write!(f, "source node is not in the tree"),
            ConnectError::TargetMissing => write!(f, "target node is not in the tree"),
            ConnectError::UnknownSignal(name) => {
                write!(f, "source does not declare signal '{}'", name)
            }
            ConnectError::AlreadyConnected => write!(f, "signal is already connected"),
            ConnectError::NotConnected => write!(f, "no such subscription"),
        }
    }
}

impl std::error::Error for ConnectError {}

pub(crate) struct Subscription {
    pub source: NodeId,
    pub signal: CompactString,
    pub target: NodeId,
    pub method: CompactString,
    pub policy: ConnectPolicy,
    pub invoke: HandlerFn,
}

pub(crate) struct DeferredCall {
    pub target: NodeId,
    pub invoke: HandlerFn,
}

/// Subscription tables for the whole tree. Owned by `SceneTree`; emission and
/// handler invocation live there because they need the node arena.
#[derive(Default)]
pub(crate) struct SignalHub {
    subs: SlotMap<SubscriptionId, Subscription>,
    by_source: FxHashMap<(NodeId, CompactString), Vec<SubscriptionId>>,
    deferred: Vec<DeferredCall>,
}

impl SignalHub {
    pub fn connect(&mut self, sub: Subscription) -> Result<SubscriptionId, ConnectError> {
        let key = (sub.source, sub.signal.clone());
        if let Some(ids) = self.by_source.get(&key) {
            for id in ids {
                if let Some(existing) = self.subs.get(*id) {
                    if existing.target == sub.target && existing.method == sub.method {
                        return Err(ConnectError::AlreadyConnected);
                    }
                }
            }
        }
        let id = self.subs.insert(sub);
        self.by_source.entry(key).or_default().push(id);
        Ok(id)
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let sub = self.subs.remove(id)?;
        let key = (sub.source, sub.signal.clone());
        if let Some(ids) = self.by_source.get_mut(&key) {
            ids.retain(|s| *s != id);
            if ids.is_empty() {
                self.by_source.remove(&key);
            }
        }
        Some(sub)
    }

    pub fn get(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subs.get(id)
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Subscriber list snapshot, in connection order.
    pub fn subscribers(&self, source: NodeId, signal: &str) -> Vec<SubscriptionId> {
        self.by_source
            .get(&(source, CompactString::from(signal)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn defer(&mut self, call: DeferredCall) {
        self.deferred.push(call);
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredCall> {
        std::mem::take(&mut self.deferred)
    }

    /// Drops every subscription touching `node` and any queued deferred call
    /// aimed at it. Called by the tree when a node is freed.
    pub fn purge_endpoint(&mut self, node: NodeId) -> usize {
        let ids: Vec<SubscriptionId> = self
            .subs
            .iter()
            .filter(|(_, s)| s.source == node || s.target == node)
            .map(|(id, _)| id)
            .collect();
        let count = ids.len();
        for id in ids {
            self.remove(id);
        }
        self.deferred.retain(|c| c.target != node);
        count
    }
}

/// Well-known signal names shared between demo behaviors and tests.
pub mod names {
    pub const READY: &str = "ready";
    pub const TREE_ENTERED: &str = "tree_entered";
    pub const TREE_EXITING: &str = "tree_exiting";
    pub const CHILD_ENTERED_TREE: &str = "child_entered_tree";
    pub const CHILD_EXITING_TREE: &str = "child_exiting_tree";
    pub const TIMEOUT: &str = "timeout";
    pub const PRESSED: &str = "pressed";
    pub const TOGGLED: &str = "toggled";
    pub const FINISHED: &str = "finished";
    pub const ANIMATION_FINISHED: &str = "animation_finished";
    pub const TEXT_CHANGED: &str = "text_changed";
}
