//! Current configuration snapshot shared with every `attach`.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::SupervisorConfig;
use crate::phase::DelayConfig;

/// Atomically swappable configuration.
///
/// Readers take a snapshot; a reload replaces the whole config at once, so a
/// request is always supervised with one consistent set of thresholds.
#[derive(Debug)]
pub struct LiveConfig {
    current: ArcSwap<SupervisorConfig>,
}

impl LiveConfig {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn snapshot(&self) -> Arc<SupervisorConfig> {
        self.current.load_full()
    }

    /// Thresholds to pass to the next `attach`.
    pub fn delays(&self) -> DelayConfig {
        self.current.load().delays
    }

    /// Replace the configuration, returning the previous one.
    pub fn replace(&self, config: SupervisorConfig) -> Arc<SupervisorConfig> {
        let previous = self.current.swap(Arc::new(config));
        tracing::info!(
            phases = self.current.load().delays.enabled().count(),
            "Configuration replaced"
        );
        previous
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;

    #[test]
    fn snapshot_survives_replace() {
        let live = LiveConfig::default();
        let before = live.snapshot();

        let mut next = SupervisorConfig::default();
        next.delays = DelayConfig::new().with(Phase::Connect, 500);
        let previous = live.replace(next);

        assert!(before.delays.is_empty());
        assert!(previous.delays.is_empty());
        assert_eq!(live.delays().get(Phase::Connect), Some(500));
    }
}
