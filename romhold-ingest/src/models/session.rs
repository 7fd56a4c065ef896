//! Pipeline run state machine
//!
//! idle → validating → hashing-and-dedup → awaiting-platform-selection (optional)
//! → planning → uploading → aggregating → done

use chrono::{DateTime, Utc};
use romhold_common::events::RunState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// Run-level bookkeeping (in-memory only)
#[derive(Debug, Clone)]
pub struct PipelineSession {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
}

impl PipelineSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            started_at: Utc::now(),
            ended_at: None,
            transitions: Vec::new(),
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        self.transitions.push(transition.clone());
        transition
    }

    /// States visited so far, in order, starting with Idle
    pub fn visited_states(&self) -> Vec<RunState> {
        let mut states = vec![RunState::Idle];
        states.extend(self.transitions.iter().map(|t| t.new_state));
        states
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for PipelineSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_recorded() {
        let mut session = PipelineSession::new();
        session.transition_to(RunState::Validating);
        let t = session.transition_to(RunState::HashingAndDedup);
        assert_eq!(t.old_state, RunState::Validating);
        assert_eq!(
            session.visited_states(),
            vec![RunState::Idle, RunState::Validating, RunState::HashingAndDedup]
        );
        assert!(session.ended_at.is_none());

        session.transition_to(RunState::Done);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }
}
