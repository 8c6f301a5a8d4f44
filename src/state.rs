use crate::config::Config;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, mutable settings. Readers take a snapshot per request.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<Config>>,
}

impl SettingsStore {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        f(&mut self.inner.write());
    }
}

/// Whether the overlay is in its answering context. Triggers are ignored
/// while it is off.
#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    active: Arc<AtomicBool>,
}

impl OverlayState {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_detached() {
        let store = SettingsStore::new(Config::default());
        let before = store.snapshot();
        store.update(|c| c.api_key = "k".to_string());
        assert!(before.api_key.is_empty());
        assert_eq!(store.snapshot().api_key, "k");
    }

    #[test]
    fn test_overlay_flag_shared_between_clones() {
        let overlay = OverlayState::new(false);
        let other = overlay.clone();
        other.set_active(true);
        assert!(overlay.is_active());
    }
}
