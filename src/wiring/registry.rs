//! Process-wide connection registry and the tree lifecycle hook.

use rustc_hash::FxHashMap;

use super::binder::{self, Connection};
use super::monitor::{DynamicBinding, DynamicChildMonitor};
use super::scanner::MetadataScanner;
use crate::graph::{NodeId, SceneTree, SubscriptionId, TreeEvent};

/// Automatic signal wiring engine. One long-lived instance per host, created
/// at startup and torn down explicitly; it owns all connection bookkeeping
/// and nothing else — nodes are referenced only through non-owning handles.
///
/// Drive it by calling [`pump`](Self::pump) after tree mutations (the host's
/// update loop is the natural place). Failures never escape a single
/// marker's or node's processing; they surface as tracing diagnostics only.
#[derive(Default)]
pub struct SignalWiring {
    scanner: MetadataScanner,
    monitor: DynamicChildMonitor,
    tracked: FxHashMap<NodeId, Vec<Connection>>,
}

impl SignalWiring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the tree's lifecycle queue and runs the wiring paths.
    pub fn pump(&mut self, tree: &mut SceneTree) {
        for event in tree.drain_events() {
            match event {
                TreeEvent::NodeAdded(node) => {
                    self.node_added(tree, node);
                    self.monitor.on_child_added(tree, node);
                }
                TreeEvent::NodeRemoved(node) => self.node_removed(tree, node),
                TreeEvent::SubscriptionDropped(sub) => self.prune_subscription(sub),
            }
        }
    }

    /// Manual mirror of the node-added path. Same code, no shadow state.
    pub fn wire_now(&mut self, tree: &mut SceneTree, node: NodeId) {
        self.node_added(tree, node);
        self.monitor.on_child_added(tree, node);
    }

    /// Manual mirror of the node-removed path.
    pub fn unwire_now(&mut self, tree: &mut SceneTree, node: NodeId) {
        self.node_removed(tree, node);
    }

    /// Nodes with at least one binding record, static or dynamic.
    pub fn tracked_count(&self) -> usize {
        let armed_only = self
            .monitor
            .armed_owners()
            .filter(|owner| !self.tracked.contains_key(owner))
            .count();
        self.tracked.len() + armed_only
    }

    pub fn watch_state(&self, node: NodeId) -> super::WatchState {
        self.monitor.state(node)
    }

    pub fn is_tracked(&self, node: NodeId) -> bool {
        self.tracked.contains_key(&node) || self.monitor.is_armed(node)
    }

    pub fn static_connections(&self, node: NodeId) -> &[Connection] {
        self.tracked.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved_connections(&self, child: NodeId) -> &[Connection] {
        self.monitor.resolved_connections(child)
    }

    pub fn resolved_count(&self) -> usize {
        self.monitor.resolved_count()
    }

    /// Unbinds every remaining connection and clears all tables, including
    /// the type cache. Safe to call repeatedly or when empty.
    pub fn teardown(&mut self, tree: &mut SceneTree) {
        for (_, conns) in self.tracked.drain() {
            for conn in &conns {
                binder::unbind(tree, conn);
            }
        }
        self.monitor.teardown(tree);
        self.scanner.clear();
        tracing::debug!("signal wiring torn down");
    }

    fn node_added(&mut self, tree: &mut SceneTree, node: NodeId) {
        if !tree.contains(node) {
            // removed again before this pass ran
            return;
        }
        if self.is_tracked(node) {
            return;
        }
        let table = {
            let Some(behavior) = tree.behavior(node) else {
                return;
            };
            match self.scanner.scan(behavior) {
                Some(table) => table,
                None => return,
            }
        };

        let mut statics = Vec::new();
        let mut dynamics = Vec::new();
        for decl in table.iter() {
            if decl.marker().is_dynamic() {
                dynamics.push(DynamicBinding {
                    owner: node,
                    decl: decl.clone(),
                });
            } else {
                statics.push(decl.clone());
            }
        }

        let mut conns = Vec::new();
        for decl in &statics {
            match binder::bind(tree, node, decl) {
                Ok(conn) => conns.push(conn),
                Err(e) => {
                    tracing::warn!(
                        node = tree.name(node).unwrap_or(""),
                        method = decl.method(),
                        signal = decl.marker().signal(),
                        error = %e,
                        "marker skipped"
                    );
                }
            }
        }

        let bound = conns.len();
        let armed = dynamics.len();
        if !conns.is_empty() {
            self.tracked.insert(node, conns);
        }
        if !dynamics.is_empty() {
            self.monitor.arm(tree, node, dynamics);
        }
        if bound + armed > 0 {
            tracing::debug!(
                node = tree.name(node).unwrap_or(""),
                statics = bound,
                dynamics = armed,
                "node wired"
            );
        }
    }

    fn node_removed(&mut self, tree: &mut SceneTree, node: NodeId) {
        if let Some(conns) = self.tracked.remove(&node) {
            for conn in &conns {
                binder::unbind(tree, conn);
            }
            tracing::debug!(?node, dropped = conns.len(), "node unwired");
        }
        self.monitor.disarm(tree, node);
        // the node may itself be a dynamically resolved source under
        // some other owner
        self.monitor.on_child_removed(tree, node);
    }

    fn prune_subscription(&mut self, sub: SubscriptionId) {
        self.tracked.retain(|_, conns| {
            conns.retain(|conn| conn.sub != sub);
            !conns.is_empty()
        });
        self.monitor.prune_subscription(sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{names, ConnectPolicy};
    use crate::wiring::{Behavior, HandlerDecl, HandlerMarker};
    use std::any::Any;

    #[derive(Default)]
    struct Plain;

    impl Behavior for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct SelfWired {
        hits: u32,
    }

    impl Behavior for SelfWired {
        fn signals(&self) -> &'static [&'static str] {
            &[names::PRESSED]
        }

        fn handlers(&self) -> Vec<HandlerDecl> {
            vec![HandlerDecl::new::<SelfWired>(
                "on_pressed",
                HandlerMarker::new(names::PRESSED).unwrap(),
                |s| s.hits += 1,
            )]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    /// One marker at a path that never resolves, one valid marker.
    #[derive(Default)]
    struct HalfBroken {
        hits: u32,
    }

    impl Behavior for HalfBroken {
        fn signals(&self) -> &'static [&'static str] {
            &[names::PRESSED]
        }

        fn handlers(&self) -> Vec<HandlerDecl> {
            vec![
                HandlerDecl::new::<HalfBroken>(
                    "on_missing",
                    HandlerMarker::new(names::TIMEOUT).unwrap().source("No/Such"),
                    |_| {},
                ),
                HandlerDecl::new::<HalfBroken>(
                    "on_pressed",
                    HandlerMarker::new(names::PRESSED).unwrap(),
                    |s| s.hits += 1,
                ),
            ]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct OneShotWired {
        hits: u32,
    }

    impl Behavior for OneShotWired {
        fn signals(&self) -> &'static [&'static str] {
            &[names::READY]
        }

        fn handlers(&self) -> Vec<HandlerDecl> {
            vec![HandlerDecl::new::<OneShotWired>(
                "on_ready",
                HandlerMarker::new(names::READY)
                    .unwrap()
                    .policy(ConnectPolicy::OneShot),
                |s| s.hits += 1,
            )]
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_zero_marker_type_is_ignored() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "Plain", Box::new(Plain))
            .unwrap();
        wiring.pump(&mut tree);

        assert!(!wiring.is_tracked(node));
        assert_eq!(wiring.tracked_count(), 0);
        assert_eq!(tree.subscription_count(), 0);
    }

    #[test]
    fn test_wire_is_idempotent() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "S", Box::new(SelfWired::default()))
            .unwrap();
        wiring.pump(&mut tree);
        assert_eq!(wiring.static_connections(node).len(), 1);

        wiring.wire_now(&mut tree, node);
        wiring.wire_now(&mut tree, node);
        assert_eq!(wiring.static_connections(node).len(), 1);
        assert_eq!(tree.subscription_count(), 1);
    }

    #[test]
    fn test_wire_unwire_round_trip() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "S", Box::new(SelfWired::default()))
            .unwrap();
        wiring.pump(&mut tree);
        assert_eq!(wiring.tracked_count(), 1);

        wiring.unwire_now(&mut tree, node);
        assert_eq!(wiring.tracked_count(), 0);
        assert_eq!(wiring.resolved_count(), 0);
        assert_eq!(tree.subscription_count(), 0);
        assert!(tree.contains(node)); // bookkeeping only, never deletes nodes
    }

    #[test]
    fn test_error_isolation() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "H", Box::new(HalfBroken::default()))
            .unwrap();
        wiring.pump(&mut tree);

        assert_eq!(wiring.static_connections(node).len(), 1);
        tree.emit(node, names::PRESSED).unwrap();
        assert_eq!(tree.behavior_as::<HalfBroken>(node).unwrap().hits, 1);
    }

    #[test]
    fn test_one_shot_pruned_from_tracking() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "O", Box::new(OneShotWired::default()))
            .unwrap();
        wiring.pump(&mut tree);
        assert!(wiring.is_tracked(node));

        tree.emit(node, names::READY).unwrap();
        tree.emit(node, names::READY).unwrap();
        wiring.pump(&mut tree);

        assert_eq!(tree.behavior_as::<OneShotWired>(node).unwrap().hits, 1);
        assert!(!wiring.is_tracked(node));
        assert_eq!(wiring.static_connections(node).len(), 0);
    }

    #[test]
    fn test_node_removal_unwires() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        let node = tree
            .add_node(tree.root(), "S", Box::new(SelfWired::default()))
            .unwrap();
        wiring.pump(&mut tree);
        assert!(wiring.is_tracked(node));

        tree.remove_node(node).unwrap();
        wiring.pump(&mut tree);
        assert!(!wiring.is_tracked(node));
        assert_eq!(wiring.tracked_count(), 0);
    }

    #[test]
    fn test_teardown_idempotent() {
        let mut tree = SceneTree::new();
        let mut wiring = SignalWiring::new();
        tree.add_node(tree.root(), "S", Box::new(SelfWired::default()))
            .unwrap();
        wiring.pump(&mut tree);

        wiring.teardown(&mut tree);
        assert_eq!(wiring.tracked_count(), 0);
        assert_eq!(tree.subscription_count(), 0);
        wiring.teardown(&mut tree); // empty teardown is fine
    }
}
