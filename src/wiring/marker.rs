//! Handler declarations: markers, typed handler entries, and the behavior
//! seam that replaces runtime reflection with an explicit table.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use compact_str::CompactString;

use super::error::MarkerError;
use crate::graph::{ConnectPolicy, HandlerFn};

/// Per-node state object. Declares the signals the node emits and the table
/// of handler declarations the wiring engine scans; both are assembled in
/// code at load time, there is no reflection.
pub trait Behavior: Any {
    /// Signals this node can emit.
    fn signals(&self) -> &'static [&'static str] {
        &[]
    }

    /// Handler declarations for this type. Called once per type; the scanner
    /// caches the result.
    fn handlers(&self) -> Vec<HandlerDecl> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Immutable declaration attached to a handler method. Built once at load
/// time; a blank signal name fails construction immediately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerMarker {
    signal: CompactString,
    source_path: CompactString,
    policy: ConnectPolicy,
    dynamic: bool,
}

impl HandlerMarker {
    pub fn new(signal: impl AsRef<str>) -> Result<Self, MarkerError> {
        let signal = signal.as_ref();
        if signal.trim().is_empty() {
            return Err(MarkerError::BlankSignalName);
        }
        Ok(Self {
            signal: signal.into(),
            source_path: CompactString::default(),
            policy: ConnectPolicy::Normal,
            dynamic: false,
        })
    }

    /// Relative path to the source node. Empty (the default) means the
    /// target node itself.
    pub fn source(mut self, path: impl AsRef<str>) -> Self {
        self.source_path = path.as_ref().into();
        self
    }

    pub fn policy(mut self, policy: ConnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve against children as they appear instead of once at wire time.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn connect_policy(&self) -> ConnectPolicy {
        self.policy
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

/// One row of a type's handler table: a marker plus the type-erased handler
/// body it belongs to.
#[derive(Clone)]
pub struct HandlerDecl {
    method: CompactString,
    marker: HandlerMarker,
    invoke: HandlerFn,
}

impl HandlerDecl {
    pub fn new<T: Behavior>(
        method: impl Into<CompactString>,
        marker: HandlerMarker,
        body: fn(&mut T),
    ) -> Self {
        let invoke: HandlerFn = Rc::new(move |any: &mut dyn Any| {
            if let Some(this) = any.downcast_mut::<T>() {
                body(this);
            }
        });
        Self {
            method: method.into(),
            marker,
            invoke,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn marker(&self) -> &HandlerMarker {
        &self.marker
    }

    pub(crate) fn invoke(&self) -> HandlerFn {
        self.invoke.clone()
    }
}

impl fmt::Debug for HandlerDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDecl")
            .field("method", &self.method)
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}
