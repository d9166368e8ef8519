//! In-process host graph: the live scene tree and its signal plumbing.

pub mod signal;
pub mod tree;

pub use signal::{names, ConnectError, ConnectPolicy, HandlerFn, SubscriptionId};
pub use tree::{NodeId, SceneTree, TreeError, TreeEvent};
