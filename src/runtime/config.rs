//! Runtime configuration.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `max_steps` | 1,000,000 |

/// Configuration for a [`Runtime`](super::Runtime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum scheduler steps before the runtime panics.
    ///
    /// The virtual clock never waits, so a run that exceeds this budget
    /// is livelocked (for example, a task re-waking itself forever).
    pub max_steps: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
        }
    }
}

impl RuntimeConfig {
    /// Returns the default configuration with any `FENCELINE_MAX_STEPS`
    /// environment override applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max_steps) = std::env::var("FENCELINE_MAX_STEPS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.max_steps = max_steps;
        }
        config
    }

    /// Sets the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }
}
