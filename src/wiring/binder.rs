//! Marker-to-connection binding: source resolution, subscribe, unsubscribe.

use compact_str::CompactString;

use super::error::{BindFailure, ResolveError};
use super::marker::{HandlerDecl, HandlerMarker};
use crate::graph::{ConnectPolicy, NodeId, SceneTree, SubscriptionId};

/// One active binding. Endpoints are non-owning slotmap handles; the record
/// is dropped, never force-destroyed, once either side leaves the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    pub signal: CompactString,
    pub method: CompactString,
    pub policy: ConnectPolicy,
    pub sub: SubscriptionId,
}

/// Resolves a marker's source for `node`: the node itself when the path is
/// empty, otherwise a relative-path lookup. The resolved node must expose
/// the declared signal.
pub fn resolve_source(
    tree: &SceneTree,
    node: NodeId,
    marker: &HandlerMarker,
) -> Result<NodeId, ResolveError> {
    let source = if marker.source_path().is_empty() {
        node
    } else {
        tree.resolve_path(node, marker.source_path())
            .ok_or_else(|| ResolveError::PathNotFound {
                path: marker.source_path().into(),
            })?
    };
    if !tree.has_signal(source, marker.signal()) {
        return Err(ResolveError::SignalMissing {
            node: tree.name(source).unwrap_or("").into(),
            signal: marker.signal().into(),
        });
    }
    Ok(source)
}

/// Binds a static marker declared on `node`.
pub fn bind(
    tree: &mut SceneTree,
    node: NodeId,
    decl: &HandlerDecl,
) -> Result<Connection, BindFailure> {
    let source = resolve_source(tree, node, decl.marker())?;
    connect(tree, source, node, decl)
}

/// Binds a dynamic rule owned by `owner` against a freshly appeared `child`.
/// `Ok(None)` means the child simply doesn't match the rule; only a host
/// rejection is an error.
pub fn bind_dynamic(
    tree: &mut SceneTree,
    owner: NodeId,
    child: NodeId,
    decl: &HandlerDecl,
) -> Result<Option<Connection>, BindFailure> {
    let Some(candidate) = dynamic_candidate(tree, child, decl.marker().source_path()) else {
        return Ok(None);
    };
    if !tree.has_signal(candidate, decl.marker().signal()) {
        return Ok(None);
    }
    connect(tree, candidate, owner, decl).map(Some)
}

/// Candidate lookup for a dynamic rule. An empty pattern selects the child
/// itself. Otherwise the full pattern is tried relative to the child; if
/// that fails and the child's own name matches the first segment, the
/// remaining suffix is tried instead (an empty suffix selects the child).
fn dynamic_candidate(tree: &SceneTree, child: NodeId, pattern: &str) -> Option<NodeId> {
    if pattern.is_empty() {
        return Some(child);
    }
    if let Some(found) = tree.resolve_path(child, pattern) {
        return Some(found);
    }
    let (first, rest) = match pattern.split_once('/') {
        Some((first, rest)) => (first, rest),
        None => (pattern, ""),
    };
    if tree.name(child) != Some(first) {
        return None;
    }
    if rest.is_empty() {
        Some(child)
    } else {
        tree.resolve_path(child, rest)
    }
}

fn connect(
    tree: &mut SceneTree,
    source: NodeId,
    target: NodeId,
    decl: &HandlerDecl,
) -> Result<Connection, BindFailure> {
    let policy = decl.marker().connect_policy();
    let sub = tree.connect(
        source,
        decl.marker().signal(),
        target,
        decl.method(),
        decl.invoke(),
        policy,
    )?;
    Ok(Connection {
        source,
        target,
        signal: decl.marker().signal().into(),
        method: decl.method().into(),
        policy,
        sub,
    })
}

/// Tears one connection down. A dead endpoint means the host already
/// discarded the subscription, which counts as success; an actual host
/// rejection is logged and swallowed.
pub fn unbind(tree: &mut SceneTree, conn: &Connection) {
    if !tree.contains(conn.source) || !tree.contains(conn.target) {
        return;
    }
    if let Err(e) = tree.disconnect(conn.sub) {
        tracing::warn!(
            signal = %conn.signal,
            method = %conn.method,
            error = %e,
            "disconnect rejected by host"
        );
    }
}
