//! Loadable resource model and its state machine.
//!
//! # State Machine
//!
//! ```text
//! Idle --[trigger fires]--> Triggered --[begin]--> Loading
//! Loading --[success]--> Loaded
//! Loading --[failure, attempt < ceiling]--> Retrying --[backoff elapsed]--> Loading
//! Loading --[failure, attempt == ceiling]--> Failed
//! any non-terminal --[dispose]--> removed (no further transitions)
//! ```
//!
//! `Loaded` and `Failed` are terminal. `attempt` counts failed attempts and
//! never decreases.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::LoadError;

/// Loading priority hint supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Critical and high priorities jump ahead of queued work.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Lifecycle state of a loadable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoadState {
    Idle,
    Triggered,
    Loading,
    Retrying,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Triggered => "triggered",
            LoadState::Loading => "loading",
            LoadState::Retrying => "retrying",
            LoadState::Loaded => "loaded",
            LoadState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: LoadState) -> bool {
        use LoadState::*;
        matches!(
            (self, next),
            (Idle, Triggered)
                | (Triggered, Loading)
                | (Loading, Loaded)
                | (Loading, Retrying)
                | (Loading, Failed)
                | (Retrying, Loading)
        )
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host renders for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub state: LoadState,
    pub retry_count: u32,
}

impl ResourceStatus {
    pub fn idle() -> Self {
        Self {
            state: LoadState::Idle,
            retry_count: 0,
        }
    }
}

/// A resource owned by the loader while it is registered.
#[derive(Debug, Clone)]
pub struct LoadableResource {
    id: String,
    priority: Priority,
    state: LoadState,
    attempt: u32,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl LoadableResource {
    pub fn new(id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            priority,
            state: LoadState::Idle,
            attempt: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    pub fn status(&self) -> ResourceStatus {
        ResourceStatus {
            state: self.state,
            retry_count: self.attempt,
        }
    }

    /// Move to `next`, stamping start/finish times.
    pub fn transition(&mut self, next: LoadState, now: Instant) -> Result<(), LoadError> {
        if !self.state.can_transition_to(next) {
            return Err(LoadError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        if next == LoadState::Loading && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }

        tracing::trace!(resource = %self.id, from = %self.state, to = %next, "Resource transition");
        self.state = next;
        Ok(())
    }

    /// Record a failed attempt. Bounded by `ceiling`.
    pub fn record_failure(&mut self, ceiling: u32) -> u32 {
        self.attempt = (self.attempt + 1).min(ceiling);
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("CRITICAL".parse::<Priority>(), Ok(Priority::Critical));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_urgency() {
        assert!(Priority::Critical.is_urgent());
        assert!(Priority::High.is_urgent());
        assert!(!Priority::Normal.is_urgent());
        assert!(!Priority::Low.is_urgent());
    }

    #[test]
    fn test_valid_transitions() {
        let now = Instant::now();
        let mut resource = LoadableResource::new("hero", Priority::Normal);
        for next in [
            LoadState::Triggered,
            LoadState::Loading,
            LoadState::Retrying,
            LoadState::Loading,
            LoadState::Loaded,
        ] {
            resource.transition(next, now).unwrap();
        }
        assert_eq!(resource.state(), LoadState::Loaded);
        assert!(resource.started_at().is_some());
        assert!(resource.finished_at().is_some());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let now = Instant::now();
        let mut resource = LoadableResource::new("hero", Priority::Normal);
        assert_eq!(
            resource.transition(LoadState::Loading, now),
            Err(LoadError::InvalidTransition {
                from: LoadState::Idle,
                to: LoadState::Loading,
            })
        );

        resource.transition(LoadState::Triggered, now).unwrap();
        resource.transition(LoadState::Loading, now).unwrap();
        resource.transition(LoadState::Failed, now).unwrap();

        for next in [
            LoadState::Idle,
            LoadState::Triggered,
            LoadState::Loading,
            LoadState::Retrying,
            LoadState::Loaded,
        ] {
            assert!(resource.transition(next, now).is_err());
        }
        assert_eq!(resource.state(), LoadState::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(LoadState::Loaded.is_terminal());
        assert!(LoadState::Failed.is_terminal());
        assert!(!LoadState::Retrying.is_terminal());
    }

    #[test]
    fn test_started_at_stamped_once() {
        let start = Instant::now();
        let later = start + std::time::Duration::from_secs(1);
        let mut resource = LoadableResource::new("a", Priority::Low);
        resource.transition(LoadState::Triggered, start).unwrap();
        resource.transition(LoadState::Loading, start).unwrap();
        resource.transition(LoadState::Retrying, later).unwrap();
        resource.transition(LoadState::Loading, later).unwrap();
        assert_eq!(resource.started_at(), Some(start));
    }

    #[test]
    fn test_record_failure_bounded() {
        let mut resource = LoadableResource::new("a", Priority::Normal);
        assert_eq!(resource.record_failure(2), 1);
        assert_eq!(resource.record_failure(2), 2);
        assert_eq!(resource.record_failure(2), 2);
        assert_eq!(resource.status().retry_count, 2);
    }
}
