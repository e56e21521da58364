use log::{debug, error};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankingEvent {
    pub seq_num: i64,
    pub enabled: bool,
}

/// What `BlankingQueue::report` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankingReport {
    Queued,
    /// Same state as the latest known event; no transition.
    Duplicate,
    /// Arrived behind the latest known event; the queue was reset to it.
    Reset,
}

/// Pending blanking transitions keyed by the pulse they take effect on.
#[derive(Debug, Default)]
pub struct BlankingQueue {
    events: BTreeMap<i64, bool>,
    last_applied: Option<BlankingEvent>,
}

impl BlankingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, seq_num: i64, enabled: bool) -> BlankingReport {
        let Some(latest) = self.latest() else {
            self.events.insert(seq_num, enabled);
            return BlankingReport::Queued;
        };

        if seq_num >= latest.seq_num {
            if enabled == latest.enabled {
                return BlankingReport::Duplicate;
            }
            self.events.insert(seq_num, enabled);
            debug!(
                "At pulse {}, blanking will be {}",
                seq_num,
                if enabled { "enabled" } else { "disabled" }
            );
            return BlankingReport::Queued;
        }

        error!(
            "Blanking event for pulse {} received after event for pulse {}; clearing {} queued events",
            seq_num,
            latest.seq_num,
            self.events.len()
        );
        self.events.clear();
        self.events.insert(seq_num, enabled);
        BlankingReport::Reset
    }

    /// Removes every event at or before `seq_num` and returns the state of the
    /// last one, if any were due.
    pub fn drain_through(&mut self, seq_num: i64) -> Option<bool> {
        let due = match seq_num.checked_add(1) {
            Some(next) => {
                let later = self.events.split_off(&next);
                std::mem::replace(&mut self.events, later)
            }
            None => std::mem::take(&mut self.events),
        };
        let (applied_seq, enabled) = due.into_iter().next_back()?;
        self.last_applied = Some(BlankingEvent {
            seq_num: applied_seq,
            enabled,
        });
        Some(enabled)
    }

    /// Most recent event known, queued or already applied.
    pub fn latest(&self) -> Option<BlankingEvent> {
        self.events
            .iter()
            .next_back()
            .map(|(&seq_num, &enabled)| BlankingEvent { seq_num, enabled })
            .or(self.last_applied)
    }

    pub fn pending(&self) -> Vec<BlankingEvent> {
        self.events
            .iter()
            .map(|(&seq_num, &enabled)| BlankingEvent { seq_num, enabled })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
