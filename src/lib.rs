//! autosignals - declarative signal wiring for a live scene tree
//!
//! Module structure:
//! - graph: the in-process host (SceneTree, signals, connect policies)
//! - wiring: the auto-wiring engine (markers, scanner, binder, monitor,
//!   registry)
//! - logging: tracing initialization for binaries
//!
//! Behaviors declare handler markers; `SignalWiring::pump` picks nodes up as
//! they enter the tree, binds their markers, and tears everything down again
//! as they leave.

pub mod graph;
pub mod logging;
pub mod wiring;

pub use graph::{names, ConnectPolicy, NodeId, SceneTree, SubscriptionId, TreeEvent};
pub use wiring::{Behavior, Connection, HandlerDecl, HandlerMarker, SignalWiring, WatchState};
