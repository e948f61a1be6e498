//! Run state machine with an audit trail of every transition.

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Ingesting,
    Validating,
    /// Validation failed; no further stage runs.
    Halted,
    Transforming,
    Training,
    Evaluating,
    /// Candidate did not beat production. Successful outcome.
    Rejected,
    Pushing,
    Completed,
    /// Fatal abort in any stage.
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Halted | PipelineState::Completed | PipelineState::Failed
        )
    }

    pub fn can_transition_to(self, to: PipelineState) -> bool {
        use PipelineState::*;
        if to == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Pending, Ingesting)
                | (Ingesting, Validating)
                | (Validating, Halted)
                | (Validating, Transforming)
                | (Transforming, Training)
                | (Training, Evaluating)
                | (Evaluating, Rejected)
                | (Evaluating, Pushing)
                | (Rejected, Completed)
                | (Pushing, Completed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Pending => write!(f, "Pending"),
            PipelineState::Ingesting => write!(f, "Ingesting"),
            PipelineState::Validating => write!(f, "Validating"),
            PipelineState::Halted => write!(f, "Halted"),
            PipelineState::Transforming => write!(f, "Transforming"),
            PipelineState::Training => write!(f, "Training"),
            PipelineState::Evaluating => write!(f, "Evaluating"),
            PipelineState::Rejected => write!(f, "Rejected"),
            PipelineState::Pushing => write!(f, "Pushing"),
            PipelineState::Completed => write!(f, "Completed"),
            PipelineState::Failed => write!(f, "Failed"),
        }
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Current state plus history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    current: PipelineState,
    history: Vec<StateTransition>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Pending,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// States visited so far, starting with `Pending`.
    pub fn path(&self) -> Vec<PipelineState> {
        std::iter::once(PipelineState::Pending)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }

    pub fn transition(&mut self, to: PipelineState) -> Result<(), PipelineError> {
        self.transition_with_note(to, None)
    }

    pub fn transition_with_note(
        &mut self,
        to: PipelineState,
        note: Option<String>,
    ) -> Result<(), PipelineError> {
        if !self.current.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        self.history.push(StateTransition {
            from: self.current,
            to,
            at: Utc::now(),
            note,
        });
        self.current = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    #[test]
    fn test_happy_path() {
        let mut state = RunState::new();
        for next in [Ingesting, Validating, Transforming, Training, Evaluating, Pushing, Completed] {
            state.transition(next).unwrap();
        }
        assert_eq!(state.current(), Completed);
        assert_eq!(state.history().len(), 7);
        assert_eq!(state.path().first(), Some(&Pending));
    }

    #[test]
    fn test_halt_is_terminal() {
        let mut state = RunState::new();
        state.transition(Ingesting).unwrap();
        state.transition(Validating).unwrap();
        state.transition_with_note(Halted, Some("missing column".into())).unwrap();
        assert!(state.current().is_terminal());
        assert!(state.transition(Transforming).is_err());
        assert!(state.transition(Failed).is_err());
        assert_eq!(state.history()[2].note.as_deref(), Some("missing column"));
    }

    #[test]
    fn test_cannot_skip_validation() {
        let mut state = RunState::new();
        state.transition(Ingesting).unwrap();
        let err = state.transition(Transforming).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                from: Ingesting,
                to: Transforming
            }
        ));
    }

    #[test]
    fn test_rejected_completes() {
        assert!(Evaluating.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Pushing));
        assert!(Training.can_transition_to(Failed));
    }
}
