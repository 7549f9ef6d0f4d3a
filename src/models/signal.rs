//! Signals observed while the gate is armed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of pointer interaction. Coordinates and targets are never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Click,
    TouchStart,
}

/// Window focus transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusChange {
    Gained,
    Lost,
}

/// An event delivered to the coordinator by a signal source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Pointer-down or tap anywhere in the document
    Pointer(PointerKind),
    /// Window focus change
    Focus(FocusChange),
    /// Attribute changed on the embedded player element
    AttributeMutation { attribute: String },
    /// Explicit "continue" action
    ManualOverride,
}

impl Signal {
    /// Parse the wire name used by the gate page (`click`, `touchstart`, ...)
    pub fn from_wire(kind: &str, attribute: Option<String>) -> Option<Self> {
        match kind {
            "click" | "pointerdown" => Some(Signal::Pointer(PointerKind::Click)),
            "touchstart" => Some(Signal::Pointer(PointerKind::TouchStart)),
            "focus" => Some(Signal::Focus(FocusChange::Gained)),
            "blur" => Some(Signal::Focus(FocusChange::Lost)),
            "mutation" => Some(Signal::AttributeMutation {
                attribute: attribute.unwrap_or_default(),
            }),
            "manual" => Some(Signal::ManualOverride),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Pointer(PointerKind::Click) => write!(f, "click"),
            Signal::Pointer(PointerKind::TouchStart) => write!(f, "touchstart"),
            Signal::Focus(FocusChange::Gained) => write!(f, "focus"),
            Signal::Focus(FocusChange::Lost) => write!(f, "blur"),
            Signal::AttributeMutation { attribute } => write!(f, "mutation({})", attribute),
            Signal::ManualOverride => write!(f, "manual"),
        }
    }
}
