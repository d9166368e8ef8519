//! Live scene tree: node arena, hierarchy, paths, lifecycle events.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use compact_str::CompactString;
use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};

use super::signal::{
    ConnectError, ConnectPolicy, DeferredCall, HandlerFn, SignalHub, Subscription, SubscriptionId,
};
use crate::wiring::Behavior;

new_key_type! { pub struct NodeId; }

#[derive(Debug)]
pub enum TreeError {
    NodeMissing,
    NameExists,
    RootRemoval,
    UnknownSignal(CompactString),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::NodeMissing => write!(f, "node is not in the tree"),
            TreeError::NameExists => write!(f, "name already exists in parent"),
            TreeError::RootRemoval => write!(f, "the root node cannot be removed"),
            TreeError::UnknownSignal(name) => {
                write!(f, "node does not declare signal '{}'", name)
            }
        }
    }
}

impl std::error::Error for TreeError {}

/// Lifecycle notification drained by the host's update loop. Node additions
/// are queued in enter order (parent first), removals in exit order (children
/// first). `SubscriptionDropped` reports one-shot subscriptions the hub
/// removed on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeEvent {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    SubscriptionDropped(SubscriptionId),
}

struct Node {
    name: CompactString,
    parent: Option<NodeId>,
    children: BTreeMap<CompactString, NodeId>,
    signals: FxHashSet<CompactString>,
    behavior: Box<dyn Behavior>,
}

struct RootBehavior;

impl Behavior for RootBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct SceneTree {
    arena: SlotMap<NodeId, Node>,
    root: NodeId,
    hub: SignalHub,
    events: Vec<TreeEvent>,
}

impl SceneTree {
    pub fn new() -> Self {
        let mut arena: SlotMap<NodeId, Node> = SlotMap::with_key();
        let root = arena.insert(Node {
            name: CompactString::const_new("root"),
            parent: None,
            children: BTreeMap::new(),
            signals: FxHashSet::default(),
            behavior: Box::new(RootBehavior),
        });
        Self {
            arena,
            root,
            hub: SignalHub::default(),
            events: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Liveness check. Stale ids from freed nodes report false because the
    /// slot generation no longer matches.
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains_key(id)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.arena.get(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.arena
            .get(id)
            .into_iter()
            .flat_map(|n| n.children.values().copied())
    }

    pub fn behavior(&self, id: NodeId) -> Option<&dyn Behavior> {
        self.arena.get(id).map(|n| n.behavior.as_ref())
    }

    pub fn behavior_as<T: Behavior>(&self, id: NodeId) -> Option<&T> {
        self.arena
            .get(id)
            .and_then(|n| n.behavior.as_any().downcast_ref::<T>())
    }

    pub fn behavior_as_mut<T: Behavior>(&mut self, id: NodeId) -> Option<&mut T> {
        self.arena
            .get_mut(id)
            .and_then(|n| n.behavior.as_any_mut().downcast_mut::<T>())
    }

    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<CompactString>,
        behavior: Box<dyn Behavior>,
    ) -> Result<NodeId, TreeError> {
        let name = name.into();
        {
            let parent_node = self.arena.get(parent).ok_or(TreeError::NodeMissing)?;
            if parent_node.children.contains_key(&name) {
                return Err(TreeError::NameExists);
            }
        }

        let signals = behavior
            .signals()
            .iter()
            .map(|s| CompactString::from(*s))
            .collect();
        let id = self.arena.insert(Node {
            name: name.clone(),
            parent: Some(parent),
            children: BTreeMap::new(),
            signals,
            behavior,
        });

        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.insert(name, id);
        }
        self.events.push(TreeEvent::NodeAdded(id));
        Ok(id)
    }

    /// Detaches and frees the whole subtree. Subscriptions touching freed
    /// nodes are purged before the removal events are queued, so by the time
    /// the host observes `NodeRemoved` the endpoints are already gone.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root {
            return Err(TreeError::RootRemoval);
        }
        let (parent, name) = {
            let node = self.arena.get(id).ok_or(TreeError::NodeMissing)?;
            (node.parent, node.name.clone())
        };
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.arena.get_mut(parent_id) {
                parent_node.children.remove(&name);
            }
        }

        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some(node) = self.arena.get(current) {
                stack.extend(node.children.values().copied());
            }
        }
        // reversed pre-order puts every child before its parent
        for current in order.into_iter().rev() {
            self.hub.purge_endpoint(current);
            self.arena.remove(current);
            self.events.push(TreeEvent::NodeRemoved(current));
        }
        Ok(())
    }

    /// Walks a relative path of `/`-separated segments; `.` stays put and
    /// `..` climbs to the parent.
    pub fn resolve_path(&self, base: NodeId, path: &str) -> Option<NodeId> {
        if path.is_empty() || !self.arena.contains_key(base) {
            return None;
        }
        let mut current = base;
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => current = self.arena.get(current)?.parent?,
                name => current = *self.arena.get(current)?.children.get(name)?,
            }
        }
        Some(current)
    }

    pub fn has_signal(&self, id: NodeId, signal: &str) -> bool {
        self.arena
            .get(id)
            .map(|n| n.signals.contains(signal))
            .unwrap_or(false)
    }

    pub fn connect(
        &mut self,
        source: NodeId,
        signal: &str,
        target: NodeId,
        method: &str,
        invoke: HandlerFn,
        policy: ConnectPolicy,
    ) -> Result<SubscriptionId, ConnectError> {
        let source_node = self.arena.get(source).ok_or(ConnectError::SourceMissing)?;
        if !source_node.signals.contains(signal) {
            return Err(ConnectError::UnknownSignal(signal.into()));
        }
        if !self.arena.contains_key(target) {
            return Err(ConnectError::TargetMissing);
        }
        self.hub.connect(Subscription {
            source,
            signal: signal.into(),
            target,
            method: method.into(),
            policy,
            invoke,
        })
    }

    pub fn disconnect(&mut self, sub: SubscriptionId) -> Result<(), ConnectError> {
        self.hub.remove(sub).map(|_| ()).ok_or(ConnectError::NotConnected)
    }

    pub fn is_connected(&self, sub: SubscriptionId) -> bool {
        self.hub.get(sub).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.hub.len()
    }

    /// Emits a declared signal. Normal and one-shot subscribers run inline in
    /// connection order; deferred subscribers are queued for the next
    /// `flush_deferred`. Returns the number of handlers invoked inline.
    pub fn emit(&mut self, source: NodeId, signal: &str) -> Result<usize, TreeError> {
        {
            let node = self.arena.get(source).ok_or(TreeError::NodeMissing)?;
            if !node.signals.contains(signal) {
                return Err(TreeError::UnknownSignal(signal.into()));
            }
        }

        let mut fired = 0;
        for id in self.hub.subscribers(source, signal) {
            // an earlier handler in this emission may have dropped it
            let Some(sub) = self.hub.get(id) else { continue };
            let target = sub.target;
            let policy = sub.policy;
            let invoke = sub.invoke.clone();
            match policy {
                ConnectPolicy::Deferred => {
                    self.hub.defer(DeferredCall { target, invoke });
                }
                ConnectPolicy::OneShot => {
                    self.hub.remove(id);
                    self.events.push(TreeEvent::SubscriptionDropped(id));
                    if let Some(node) = self.arena.get_mut(target) {
                        invoke(node.behavior.as_any_mut());
                        fired += 1;
                    }
                }
                ConnectPolicy::Normal => {
                    if let Some(node) = self.arena.get_mut(target) {
                        invoke(node.behavior.as_any_mut());
                        fired += 1;
                    }
                }
            }
        }
        Ok(fired)
    }

    /// End-of-cycle synchronization point for deferred subscriptions.
    /// Targets freed since emission are skipped.
    pub fn flush_deferred(&mut self) -> usize {
        let mut run = 0;
        for call in self.hub.take_deferred() {
            if let Some(node) = self.arena.get_mut(call.target) {
                (call.invoke)(node.behavior.as_any_mut());
                run += 1;
            }
        }
        run
    }

    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::signal::names;
    use std::rc::Rc;

    #[derive(Default)]
    struct Emitter {
        hits: u32,
    }

    impl Behavior for Emitter {
        fn signals(&self) -> &'static [&'static str] {
            &[names::PRESSED, names::TIMEOUT]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn bump() -> HandlerFn {
        Rc::new(|any: &mut dyn Any| {
            if let Some(e) = any.downcast_mut::<Emitter>() {
                e.hits += 1;
            }
        })
    }

    #[test]
    fn test_add_and_remove() {
        let mut tree = SceneTree::new();
        let a = tree
            .add_node(tree.root(), "A", Box::new(Emitter::default()))
            .unwrap();
        let b = tree.add_node(a, "B", Box::new(Emitter::default())).unwrap();

        assert!(tree.contains(a));
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!(tree.name(b), Some("B"));

        tree.remove_node(a).unwrap();
        assert!(!tree.contains(a));
        assert!(!tree.contains(b));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut tree = SceneTree::new();
        tree.add_node(tree.root(), "A", Box::new(Emitter::default()))
            .unwrap();
        let err = tree
            .add_node(tree.root(), "A", Box::new(Emitter::default()))
            .unwrap_err();
        assert!(matches!(err, TreeError::NameExists));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = SceneTree::new();
        assert!(matches!(
            tree.remove_node(tree.root()),
            Err(TreeError::RootRemoval)
        ));
    }

    #[test]
    fn test_resolve_path() {
        let mut tree = SceneTree::new();
        let a = tree
            .add_node(tree.root(), "A", Box::new(Emitter::default()))
            .unwrap();
        let b = tree.add_node(a, "B", Box::new(Emitter::default())).unwrap();
        let c = tree.add_node(b, "C", Box::new(Emitter::default())).unwrap();

        assert_eq!(tree.resolve_path(a, "B/C"), Some(c));
        assert_eq!(tree.resolve_path(c, "../.."), Some(a));
        assert_eq!(tree.resolve_path(a, "./B"), Some(b));
        assert_eq!(tree.resolve_path(a, "missing"), None);
        assert_eq!(tree.resolve_path(a, ""), None);
    }

    #[test]
    fn test_events_order() {
        let mut tree = SceneTree::new();
        let a = tree
            .add_node(tree.root(), "A", Box::new(Emitter::default()))
            .unwrap();
        let b = tree.add_node(a, "B", Box::new(Emitter::default())).unwrap();
        assert_eq!(
            tree.drain_events(),
            vec![TreeEvent::NodeAdded(a), TreeEvent::NodeAdded(b)]
        );

        tree.remove_node(a).unwrap();
        assert_eq!(
            tree.drain_events(),
            vec![TreeEvent::NodeRemoved(b), TreeEvent::NodeRemoved(a)]
        );
    }

    #[test]
    fn test_emit_normal() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        let dst = tree
            .add_node(tree.root(), "Dst", Box::new(Emitter::default()))
            .unwrap();
        tree.connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::Normal)
            .unwrap();

        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 1);
        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 1);
        assert_eq!(tree.behavior_as::<Emitter>(dst).unwrap().hits, 2);
    }

    #[test]
    fn test_emit_unknown_signal() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        assert!(matches!(
            tree.emit(src, "nope"),
            Err(TreeError::UnknownSignal(_))
        ));
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        let dst = tree
            .add_node(tree.root(), "Dst", Box::new(Emitter::default()))
            .unwrap();
        tree.connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::Normal)
            .unwrap();
        let err = tree
            .connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::Normal)
            .unwrap_err();
        assert_eq!(err, ConnectError::AlreadyConnected);
    }

    #[test]
    fn test_deferred_runs_at_flush() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        let dst = tree
            .add_node(tree.root(), "Dst", Box::new(Emitter::default()))
            .unwrap();
        tree.connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::Deferred)
            .unwrap();

        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 0);
        assert_eq!(tree.behavior_as::<Emitter>(dst).unwrap().hits, 0);
        assert_eq!(tree.flush_deferred(), 1);
        assert_eq!(tree.behavior_as::<Emitter>(dst).unwrap().hits, 1);
        assert_eq!(tree.flush_deferred(), 0);
    }

    #[test]
    fn test_one_shot_removes_itself() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        let dst = tree
            .add_node(tree.root(), "Dst", Box::new(Emitter::default()))
            .unwrap();
        let sub = tree
            .connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::OneShot)
            .unwrap();
        tree.drain_events();

        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 1);
        assert!(!tree.is_connected(sub));
        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 0);
        assert_eq!(tree.behavior_as::<Emitter>(dst).unwrap().hits, 1);
        assert_eq!(tree.drain_events(), vec![TreeEvent::SubscriptionDropped(sub)]);
    }

    #[test]
    fn test_removal_purges_subscriptions() {
        let mut tree = SceneTree::new();
        let src = tree
            .add_node(tree.root(), "Src", Box::new(Emitter::default()))
            .unwrap();
        let dst = tree
            .add_node(tree.root(), "Dst", Box::new(Emitter::default()))
            .unwrap();
        let sub = tree
            .connect(src, names::PRESSED, dst, "bump", bump(), ConnectPolicy::Normal)
            .unwrap();

        tree.remove_node(dst).unwrap();
        assert!(!tree.is_connected(sub));
        assert_eq!(tree.subscription_count(), 0);
        assert_eq!(tree.emit(src, names::PRESSED).unwrap(), 0);
    }
}
