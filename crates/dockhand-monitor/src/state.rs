//! Debounced health classification over a sliding sample window.
//!
//! The transition rule is pure so it can be tested without a runtime or a
//! clock: classification moves only on a unanimous window — all of the
//! last N samples alive, or none of them.

use std::fmt;

/// Raw states counting as "alive" for the debounce rule.
const ALIVE_STATES: [&str; 2] = ["running", "healthy"];

/// Committed health classification of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Unknown,
    Running,
    Stopped,
    Unhealthy,
    Exited,
}

impl MonitorState {
    /// Terminal kinds: confirmed-down classifications that notify once
    /// and then hold until a confirmed recovery.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorState::Stopped | MonitorState::Unhealthy | MonitorState::Exited
        )
    }

    /// Classification adopted when a container is confirmed down, from
    /// the single most recent raw sample.
    fn from_down_sample(raw: &str) -> Self {
        match raw {
            "exited" => MonitorState::Exited,
            "unhealthy" => MonitorState::Unhealthy,
            _ => MonitorState::Stopped,
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorState::Unknown => "unknown",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
            MonitorState::Unhealthy => "unhealthy",
            MonitorState::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Transition worth surfacing to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// Confirmed running again after a terminal classification.
    Recovered,
    /// Confirmed down; carries the newly adopted classification.
    WentDown(MonitorState),
}

/// Apply the debounce rule to the stored history.
///
/// With fewer than `retries` samples the classification is forced to
/// `Unknown`. Otherwise only the most recent `retries` samples are
/// inspected: all alive commits `Running` (a recovery event if the
/// previous classification was terminal), zero alive commits the
/// classification of the newest sample (a down event unless already
/// terminal), and any mixed window leaves the classification unchanged.
pub fn advance(
    current: MonitorState,
    samples: &[String],
    retries: usize,
) -> (MonitorState, Option<HealthEvent>) {
    if samples.len() < retries {
        return (MonitorState::Unknown, None);
    }

    let window = &samples[samples.len() - retries..];
    let alive = window
        .iter()
        .filter(|raw| ALIVE_STATES.contains(&raw.as_str()))
        .count();

    if alive == retries {
        let event = current.is_terminal().then_some(HealthEvent::Recovered);
        (MonitorState::Running, event)
    } else if alive == 0 {
        if current.is_terminal() {
            // Stable outage: hold the classification, no repeat alert.
            (current, None)
        } else {
            let next = MonitorState::from_down_sample(window[retries - 1].as_str());
            (next, Some(HealthEvent::WentDown(next)))
        }
    } else {
        // Mixed window: unanimous confirmation required in either
        // direction, so the classification holds.
        (current, None)
    }
}

/// Per-container monitor bookkeeping: bounded raw-state history plus the
/// committed classification.
#[derive(Debug, Default, Clone)]
pub struct MonitorRecord {
    pub samples: Vec<String>,
    pub state: MonitorState,
}

impl MonitorRecord {
    pub fn observe(&mut self, raw: String) {
        self.samples.push(raw);
    }

    /// Once the history reaches `4 * retries` samples, drop the oldest
    /// `2 * retries`, retaining recency while bounding memory.
    pub fn compact(&mut self, retries: usize) {
        if retries > 0 && self.samples.len() >= retries * 4 {
            self.samples.drain(..retries * 2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_history_forces_unknown() {
        let (state, event) = advance(MonitorState::Running, &samples(&["running"]), 3);
        assert_eq!(state, MonitorState::Unknown);
        assert_eq!(event, None);
    }

    #[test]
    fn unanimous_alive_window_adopts_running_silently() {
        let history = samples(&["running", "running", "running"]);
        let (state, event) = advance(MonitorState::Unknown, &history, 3);
        assert_eq!(state, MonitorState::Running);
        assert_eq!(event, None);
    }

    #[test]
    fn healthy_counts_as_alive() {
        let history = samples(&["healthy", "running", "healthy"]);
        let (state, event) = advance(MonitorState::Unknown, &history, 3);
        assert_eq!(state, MonitorState::Running);
        assert_eq!(event, None);
    }

    #[test]
    fn recovery_from_terminal_state_emits_event() {
        let history = samples(&["running", "running", "running"]);
        let (state, event) = advance(MonitorState::Exited, &history, 3);
        assert_eq!(state, MonitorState::Running);
        assert_eq!(event, Some(HealthEvent::Recovered));
    }

    #[test]
    fn unanimous_down_window_adopts_latest_sample() {
        let history = samples(&["running", "running", "running", "exited", "exited", "exited"]);
        let (state, event) = advance(MonitorState::Running, &history, 3);
        assert_eq!(state, MonitorState::Exited);
        assert_eq!(event, Some(HealthEvent::WentDown(MonitorState::Exited)));
    }

    #[test]
    fn stable_outage_does_not_renotify() {
        let history = samples(&["exited", "exited", "exited"]);
        let (state, event) = advance(MonitorState::Exited, &history, 3);
        assert_eq!(state, MonitorState::Exited);
        assert_eq!(event, None);
    }

    #[test]
    fn mixed_window_holds_the_classification() {
        let history = samples(&["running", "exited", "running"]);
        for current in [MonitorState::Running, MonitorState::Exited, MonitorState::Unknown] {
            let (state, event) = advance(current, &history, 3);
            assert_eq!(state, current);
            assert_eq!(event, None);
        }
    }

    #[test]
    fn unrecognized_down_states_classify_as_stopped() {
        let history = samples(&["paused", "dead", "created"]);
        let (state, event) = advance(MonitorState::Running, &history, 3);
        assert_eq!(state, MonitorState::Stopped);
        assert_eq!(event, Some(HealthEvent::WentDown(MonitorState::Stopped)));
    }

    #[test]
    fn unhealthy_window_classifies_as_unhealthy() {
        let history = samples(&["unhealthy", "unhealthy", "unhealthy"]);
        let (state, event) = advance(MonitorState::Running, &history, 3);
        assert_eq!(state, MonitorState::Unhealthy);
        assert_eq!(event, Some(HealthEvent::WentDown(MonitorState::Unhealthy)));
    }

    #[test]
    fn history_compacts_from_four_to_two_windows() {
        let mut record = MonitorRecord::default();
        for i in 0..12 {
            record.observe(format!("sample-{i}"));
            record.compact(3);
        }
        // At 12 (= 4 * 3) samples the oldest 6 are dropped.
        assert_eq!(record.samples.len(), 6);
        assert_eq!(record.samples[0], "sample-6");
    }
}
