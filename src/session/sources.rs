//! Signal source capabilities
//!
//! A session depends only on abstract sources. Each source is attached to a
//! [`SignalSink`] once the gate is armed; a source that cannot be established
//! reports [`SourceError::Unavailable`] and the session carries on without it.

use crate::models::Signal;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// The capability set a gate session can listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Pointer,
    Focus,
    AttributeMutation,
    ManualOverride,
}

impl Capability {
    /// Capability that delivers the given signal
    pub fn of(signal: &Signal) -> Self {
        match signal {
            Signal::Pointer(_) => Capability::Pointer,
            Signal::Focus(_) => Capability::Focus,
            Signal::AttributeMutation { .. } => Capability::AttributeMutation,
            Signal::ManualOverride => Capability::ManualOverride,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Pointer => "pointer",
            Capability::Focus => "focus",
            Capability::AttributeMutation => "attribute-mutation",
            Capability::ManualOverride => "manual-override",
        };
        f.write_str(name)
    }
}

/// Errors raised while attaching a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0} observation is not available in this environment")]
    Unavailable(Capability),
}

/// Sending half handed to attached sources
#[derive(Debug, Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { tx }
    }

    /// Deliver a signal. Returns false once the session has ended.
    pub fn emit(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Something the session can listen to
pub trait SignalSource: Send {
    fn capability(&self) -> Capability;

    /// Start delivering signals into `sink`
    fn attach(self: Box<Self>, sink: SignalSink) -> Result<(), SourceError>;
}

/// A source that never attaches, standing in for unsupported observation
#[derive(Debug, Clone, Copy)]
pub struct UnavailableSource(pub Capability);

impl SignalSource for UnavailableSource {
    fn capability(&self) -> Capability {
        self.0
    }

    fn attach(self: Box<Self>, _sink: SignalSink) -> Result<(), SourceError> {
        Err(SourceError::Unavailable(self.0))
    }
}

/// Per-capability sink table shared with an external event producer.
///
/// Sources built with [`SourceRoutes::source`] register their sink here on
/// attach; [`SourceRoutes::dispatch`] forwards a signal only when its
/// capability was attached.
#[derive(Debug, Clone, Default)]
pub struct SourceRoutes {
    sinks: Arc<Mutex<HashMap<Capability, SignalSink>>>,
}

impl SourceRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source for one capability, routed through this table
    pub fn source(&self, capability: Capability) -> Box<dyn SignalSource> {
        Box::new(RoutedSource {
            capability,
            routes: self.clone(),
        })
    }

    /// Forward a signal. Returns false if no sink handles its capability.
    pub fn dispatch(&self, signal: Signal) -> bool {
        let capability = Capability::of(&signal);
        let sink = self.lock().get(&capability).cloned();
        match sink {
            Some(sink) => sink.emit(signal),
            None => {
                tracing::trace!(%capability, "no source attached, signal dropped");
                false
            }
        }
    }

    pub fn is_attached(&self, capability: Capability) -> bool {
        self.lock().contains_key(&capability)
    }

    /// Drop every sink so the session can finish
    pub fn detach_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Capability, SignalSink>> {
        self.sinks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct RoutedSource {
    capability: Capability,
    routes: SourceRoutes,
}

impl SignalSource for RoutedSource {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn attach(self: Box<Self>, sink: SignalSink) -> Result<(), SourceError> {
        self.routes.lock().insert(self.capability, sink);
        Ok(())
    }
}
