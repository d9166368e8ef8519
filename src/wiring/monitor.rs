//! Per-owner monitoring of child activity for dynamic markers.

use rustc_hash::{FxHashMap, FxHashSet};

use super::binder::{self, Connection};
use super::marker::HandlerDecl;
use crate::graph::{NodeId, SceneTree, SubscriptionId};

/// A rule, not a binding: it never holds a resolved source. Resolution
/// happens against concrete children as they appear under the owner.
#[derive(Clone, Debug)]
pub struct DynamicBinding {
    pub owner: NodeId,
    pub decl: HandlerDecl,
}

/// Owner lifecycle for dynamic rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WatchState {
    /// No dynamic rules declared, or the owner never entered the tree.
    Unarmed,
    /// Rules stored, child activity under the owner is being resolved.
    Armed,
    /// Owner left the tree; rules and resolved bindings were dropped.
    Disarmed,
}

struct Watch {
    state: WatchState,
    rules: Vec<DynamicBinding>,
}

#[derive(Default)]
pub struct DynamicChildMonitor {
    watches: FxHashMap<NodeId, Watch>,
    /// Resolved connections keyed by the direct child that produced them,
    /// even when the actual source sits deeper in that child's subtree.
    resolved: FxHashMap<NodeId, Vec<Connection>>,
    /// Owners that went through Armed -> Disarmed. Node ids are never
    /// reused, so this only grows by one entry per removed owner.
    retired: FxHashSet<NodeId>,
}

impl DynamicChildMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, owner: NodeId) -> WatchState {
        if let Some(watch) = self.watches.get(&owner) {
            watch.state
        } else if self.retired.contains(&owner) {
            WatchState::Disarmed
        } else {
            WatchState::Unarmed
        }
    }

    pub fn is_armed(&self, owner: NodeId) -> bool {
        self.state(owner) == WatchState::Armed
    }

    pub fn armed_owners(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.watches.keys().copied()
    }

    pub fn resolved_connections(&self, child: NodeId) -> &[Connection] {
        self.resolved.get(&child).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.values().map(Vec::len).sum()
    }

    /// Unarmed -> Armed. Stores the owner's rules and eagerly resolves them
    /// against children already present, so pre-existing children are
    /// covered, not only future ones.
    pub fn arm(&mut self, tree: &mut SceneTree, owner: NodeId, rules: Vec<DynamicBinding>) {
        if rules.is_empty() {
            return;
        }
        self.retired.remove(&owner);

        let children: Vec<NodeId> = tree.children(owner).collect();
        for child in children {
            if self.resolved.contains_key(&child) {
                continue;
            }
            let conns = resolve_child(tree, child, &rules);
            if !conns.is_empty() {
                self.resolved.insert(child, conns);
            }
        }

        tracing::debug!(?owner, rules = rules.len(), "dynamic monitor armed");
        self.watches.insert(
            owner,
            Watch {
                state: WatchState::Armed,
                rules,
            },
        );
    }

    /// Resolves every rule of the child's parent (if armed) against the
    /// child. Children already carrying resolved entries from this pass are
    /// skipped so the eager arm pass and the child-added notification cannot
    /// double-bind.
    pub fn on_child_added(&mut self, tree: &mut SceneTree, child: NodeId) {
        let Some(parent) = tree.parent(child) else {
            return;
        };
        let rules = match self.watches.get(&parent) {
            Some(watch) if watch.state == WatchState::Armed => watch.rules.clone(),
            _ => return,
        };
        if self.resolved.contains_key(&child) {
            return;
        }
        let conns = resolve_child(tree, child, &rules);
        if !conns.is_empty() {
            self.resolved.insert(child, conns);
        }
    }

    /// Unbinds and drops every connection recorded under the child's key.
    pub fn on_child_removed(&mut self, tree: &mut SceneTree, child: NodeId) {
        if let Some(conns) = self.resolved.remove(&child) {
            for conn in &conns {
                binder::unbind(tree, conn);
            }
            tracing::debug!(?child, dropped = conns.len(), "dynamic child unbound");
        }
    }

    /// Armed -> Disarmed. Drops the owner's rules and every resolved
    /// connection that targets it.
    pub fn disarm(&mut self, tree: &mut SceneTree, owner: NodeId) {
        if self.watches.remove(&owner).is_none() {
            return;
        }
        self.retired.insert(owner);

        self.resolved.retain(|_, conns| {
            conns.retain(|conn| {
                if conn.target == owner {
                    binder::unbind(tree, conn);
                    false
                } else {
                    true
                }
            });
            !conns.is_empty()
        });
        tracing::debug!(?owner, "dynamic monitor disarmed");
    }

    /// Drops the record for a subscription the host already removed
    /// (one-shot expiry).
    pub fn prune_subscription(&mut self, sub: SubscriptionId) {
        self.resolved.retain(|_, conns| {
            conns.retain(|conn| conn.sub != sub);
            !conns.is_empty()
        });
    }

    /// Unbinds everything and forgets all owners. Safe to call when empty.
    pub fn teardown(&mut self, tree: &mut SceneTree) {
        for conns in self.resolved.values() {
            for conn in conns {
                binder::unbind(tree, conn);
            }
        }
        self.resolved.clear();
        self.watches.clear();
        self.retired.clear();
    }
}

fn resolve_child(tree: &mut SceneTree, child: NodeId, rules: &[DynamicBinding]) -> Vec<Connection> {
    let mut conns: Vec<Connection> = Vec::new();
    for rule in rules {
        match binder::bind_dynamic(tree, rule.owner, child, &rule.decl) {
            Ok(Some(conn)) => {
                tracing::debug!(
                    signal = %conn.signal,
                    method = %conn.method,
                    ?child,
                    "dynamic connection established"
                );
                conns.push(conn);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    method = rule.decl.method(),
                    signal = rule.decl.marker().signal(),
                    error = %e,
                    "dynamic rule skipped"
                );
            }
        }
    }
    conns
}
