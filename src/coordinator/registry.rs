use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use launchguard_core::types::LaunchState;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// How long a finished launch is remembered so late duplicates stay ignored.
pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(600);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Launch {0} is not tracked")]
    Unknown(String),

    #[error("Launch {key} cannot move from {from:?} to {to:?}")]
    Invalid {
        key: String,
        from: LaunchState,
        to: LaunchState,
    },
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: LaunchState,
    /// Set once the state is terminal
    settled_at: Option<Instant>,
}

impl Tracked {
    fn new(state: LaunchState) -> Self {
        Self {
            state,
            settled_at: None,
        }
    }
}

/// Lifecycle state of live launches, keyed by creation signature. Terminal
/// launches linger as tombstones until `prune` drops them.
#[derive(Debug)]
pub struct LaunchRegistry {
    states: DashMap<String, Tracked>,
    tombstone_ttl: Duration,
}

impl Default for LaunchRegistry {
    fn default() -> Self {
        Self::with_tombstone_ttl(DEFAULT_TOMBSTONE_TTL)
    }
}

impl LaunchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tombstone_ttl(tombstone_ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            tombstone_ttl,
        }
    }

    /// Starts tracking a launch. False for a duplicate notification.
    pub fn begin(&self, key: &str) -> bool {
        match self.states.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Tracked::new(LaunchState::New));
                true
            }
        }
    }

    /// Tracks a launch whose retention check was restored from disk.
    pub fn resume_awaiting(&self, key: &str) {
        self.states
            .entry(key.to_string())
            .or_insert(Tracked::new(LaunchState::AwaitingRetentionCheck));
    }

    pub fn state(&self, key: &str) -> Option<LaunchState> {
        self.states.get(key).map(|t| t.state)
    }

    /// Applies a forward transition. Invalid moves are logged and refused.
    pub fn advance(&self, key: &str, next: LaunchState) -> Result<LaunchState, TransitionError> {
        let mut tracked = self
            .states
            .get_mut(key)
            .ok_or_else(|| TransitionError::Unknown(key.to_string()))?;

        let current = tracked.state;
        if !current.can_advance_to(next) {
            let err = TransitionError::Invalid {
                key: key.to_string(),
                from: current,
                to: next,
            };
            error!(error = %err, "Refused launch state transition");
            return Err(err);
        }
        tracked.state = next;
        if next.is_terminal() {
            tracked.settled_at = Some(Instant::now());
        }
        Ok(current)
    }

    /// Drops terminal launches older than the tombstone TTL. Returns how
    /// many were removed.
    pub fn prune(&self) -> usize {
        let before = self.states.len();
        let ttl = self.tombstone_ttl;
        self.states.retain(|_, tracked| match tracked.settled_at {
            Some(settled) => settled.elapsed() < ttl,
            None => true,
        });
        let removed = before.saturating_sub(self.states.len());
        if removed > 0 {
            debug!(removed, live = self.states.len(), "Pruned settled launches");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
