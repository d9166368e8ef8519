//! Automatic event-handler wiring engine.
//!
//! - marker: handler declarations and the behavior seam
//! - scanner: per-type declaration tables with caching
//! - binder: marker resolution and subscribe/unsubscribe
//! - monitor: dynamic per-owner child watching
//! - registry: process-wide tracking and the lifecycle hook

pub mod binder;
pub mod error;
pub mod marker;
pub mod monitor;
pub mod registry;
pub mod scanner;

pub use binder::Connection;
pub use error::{BindFailure, MarkerError, ResolveError};
pub use marker::{Behavior, HandlerDecl, HandlerMarker};
pub use monitor::{DynamicBinding, DynamicChildMonitor, WatchState};
pub use registry::SignalWiring;
pub use scanner::MetadataScanner;
