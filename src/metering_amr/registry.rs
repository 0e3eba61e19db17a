use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;

use crate::models::{MeterUnit, Reading};

/// Per-meter announce state, one entry per distinct meter key
pub struct MeterState {
    pub announced: bool,
    pub unit: MeterUnit,
    pub last_seen: DateTime<Utc>,
}

/// Tracks which meters have already been announced to the broker. Entries are
/// never evicted; the cardinality is bounded by the meters in radio range.
pub struct MeterRegistry {
    meters: HashMap<String, MeterState>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        return MeterRegistry {
            meters: HashMap::new(),
        };
    }

    /// Record a valid reading. Returns true while the meter still needs its
    /// discovery messages, i.e. until [`mark_announced`] has been called for
    /// the key. A fresh key is inserted with `announced` unset.
    ///
    /// [`mark_announced`]: MeterRegistry::mark_announced
    pub fn observe(&mut self, reading: &Reading) -> bool {
        let key = reading.key();
        match self.meters.get_mut(&key) {
            Some(state) => {
                state.last_seen = Utc::now();
                return !state.announced;
            }
            None => {
                debug!("First sighting of meter {key}");
                self.meters.insert(
                    key,
                    MeterState {
                        announced: false,
                        unit: reading.unit,
                        last_seen: Utc::now(),
                    },
                );
                return true;
            }
        }
    }

    /// Flip the announced flag. The caller only does this after the discovery
    /// messages were dispatched, so a failed dispatch is retried on the next
    /// reading (discovery topics are retained, the retry is idempotent).
    pub fn mark_announced(&mut self, reading: &Reading) {
        if let Some(state) = self.meters.get_mut(&reading.key()) {
            state.announced = true;
        }
    }

    pub fn get(&self, key: &str) -> Option<&MeterState> {
        return self.meters.get(key);
    }

    pub fn len(&self) -> usize {
        return self.meters.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.meters.is_empty();
    }
}
