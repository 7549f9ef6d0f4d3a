//! Session view: what the gate page should currently show

use crate::session::GateHost;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Snapshot polled by the gate page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateView {
    pub loading_visible: bool,
    pub override_visible: bool,
    pub transitioned: bool,
    pub redirect: Option<String>,
}

/// [`GateHost`] that records effects into a view shared with HTTP handlers.
///
/// The manual-override control is hidden once the transition has played.
#[derive(Debug, Clone, Default)]
pub struct SharedView {
    inner: Arc<Mutex<GateView>>,
}

impl SharedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> GateView {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateView> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GateHost for SharedView {
    fn reveal_loading(&mut self) {
        self.lock().loading_visible = true;
    }

    fn reveal_override(&mut self) {
        let mut view = self.lock();
        if !view.transitioned {
            view.override_visible = true;
        }
    }

    fn show_transition(&mut self) {
        let mut view = self.lock();
        view.transitioned = true;
        view.override_visible = false;
    }

    fn navigate(&mut self, destination: &str) {
        self.lock().redirect = Some(destination.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_effects_visible_through_clones() {
        let view = SharedView::new();
        let mut host = view.clone();

        host.reveal_loading();
        host.show_transition();
        host.navigate("main.html");

        let snapshot = view.snapshot();
        assert!(snapshot.loading_visible);
        assert!(!snapshot.override_visible);
        assert!(snapshot.transitioned);
        assert_eq!(snapshot.redirect.as_deref(), Some("main.html"));
    }

    #[test]
    fn test_override_hidden_after_transition() {
        let view = SharedView::new();
        let mut host = view.clone();

        host.show_transition();
        host.reveal_override();
        assert!(!view.snapshot().override_visible);

        let view = SharedView::new();
        let mut host = view.clone();

        host.reveal_override();
        host.show_transition();
        assert!(!view.snapshot().override_visible);
    }
}
