//! Pipeline lifecycle state machine (spec.md §4.5): the legal transitions
//! between pipeline states, and the structured error envelope returned to
//! control-plane callers when an operation is rejected. Mirrors the
//! teacher's `RdeError` in spirit, a closed `thiserror` enum rather than
//! stringly-typed errors, but carries enough structure (codes, valid
//! targets) for an HTTP layer to render a 4xx response directly.

use serde::{Deserialize, Serialize};

/// One of the seven legal pipeline states (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStatus {
    Created,
    Running,
    Resuming,
    Stopping,
    Stopped,
    Terminating,
    Failed,
}

impl PipelineStatus {
    /// `Resuming`, `Stopping`, `Terminating` denote an in-flight control
    /// operation; only a request for `Terminating` may interrupt one.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            PipelineStatus::Resuming | PipelineStatus::Stopping | PipelineStatus::Terminating
        )
    }

    /// The state matrix (spec.md §4.5), encoded as data rather than
    /// scattered conditionals. The sole exception, `Terminating` always
    /// reachable, is handled in [`validate`] before this table is
    /// consulted.
    fn allowed_targets(self) -> &'static [PipelineStatus] {
        use PipelineStatus::*;
        match self {
            Created => &[Running, Terminating, Failed],
            Running => &[Stopping, Terminating, Failed],
            Resuming => &[Running, Terminating, Failed],
            Stopping => &[Stopped, Terminating, Failed],
            Stopped => &[Resuming, Failed],
            Terminating => &[Stopped, Failed],
            Failed => &[Resuming],
        }
    }
}

/// Machine-readable codes for the error envelope (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleErrorCode {
    InvalidStatusTransition,
    UnknownStatus,
    PipelineNotFound,
    PipelineAlreadyInState,
    PipelineInTransition,
}

impl LifecycleErrorCode {
    /// Boundary-HTTP status for this code; spec.md §4.5: "a boundary-HTTP
    /// code (400 for validation)".
    pub fn http_status(self) -> u16 {
        match self {
            LifecycleErrorCode::PipelineNotFound => 404,
            _ => 400,
        }
    }
}

/// The `{current_status, requested_status, message, code,
/// valid_transitions[]}` envelope (spec.md §6), returned unchanged to the
/// caller. Lifecycle errors never mutate pipeline state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleError {
    pub current_status: Option<PipelineStatus>,
    pub requested_status: PipelineStatus,
    pub message: String,
    pub code: LifecycleErrorCode,
    pub valid_transitions: Vec<PipelineStatus>,
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LifecycleError {}

/// `validate(pipeline, requested)` (spec.md §4.5). `current` is `None`
/// when the pipeline is absent from the store.
pub fn validate(
    current: Option<PipelineStatus>,
    requested: PipelineStatus,
) -> Result<(), LifecycleError> {
    let current = match current {
        None => {
            return Err(LifecycleError {
                current_status: None,
                requested_status: requested,
                message: "pipeline not found".to_string(),
                code: LifecycleErrorCode::PipelineNotFound,
                valid_transitions: Vec::new(),
            })
        }
        Some(c) => c,
    };

    if current == requested {
        return Err(LifecycleError {
            current_status: Some(current),
            requested_status: requested,
            message: format!("pipeline is already in state {:?}", current),
            code: LifecycleErrorCode::PipelineAlreadyInState,
            valid_transitions: current.allowed_targets().to_vec(),
        });
    }

    if current.is_transitional() && requested != PipelineStatus::Terminating {
        return Err(LifecycleError {
            current_status: Some(current),
            requested_status: requested,
            message: format!("pipeline is in transitional state {:?}", current),
            code: LifecycleErrorCode::PipelineInTransition,
            valid_transitions: vec![PipelineStatus::Terminating],
        });
    }

    if current.allowed_targets().contains(&requested) {
        Ok(())
    } else {
        Err(LifecycleError {
            current_status: Some(current),
            requested_status: requested,
            message: format!("cannot transition from {:?} to {:?}", current, requested),
            code: LifecycleErrorCode::InvalidStatusTransition,
            valid_transitions: current.allowed_targets().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineStatus::*;

    #[test]
    fn pipeline_not_found_when_absent() {
        let err = validate(None, Running).unwrap_err();
        assert_eq!(err.code, LifecycleErrorCode::PipelineNotFound);
    }

    #[test]
    fn already_in_state() {
        let err = validate(Some(Running), Running).unwrap_err();
        assert_eq!(err.code, LifecycleErrorCode::PipelineAlreadyInState);
    }

    #[test]
    fn transitional_state_only_allows_terminating() {
        let err = validate(Some(Stopping), Running).unwrap_err();
        assert_eq!(err.code, LifecycleErrorCode::PipelineInTransition);
        assert_eq!(err.valid_transitions, vec![Terminating]);

        assert!(validate(Some(Stopping), Terminating).is_ok());
    }

    #[test]
    fn scenario_6_running_to_stopped_is_invalid_then_stopping_is_ok() {
        let err = validate(Some(Running), Stopped).unwrap_err();
        assert_eq!(err.code, LifecycleErrorCode::InvalidStatusTransition);
        assert_eq!(err.valid_transitions, vec![Stopping, Terminating, Failed]);

        assert!(validate(Some(Running), Stopping).is_ok());
    }

    #[test]
    fn terminating_always_reachable_from_non_terminal_states() {
        for s in [Created, Running, Resuming, Stopping, Stopped] {
            assert!(validate(Some(s), Terminating).is_ok() || s == Terminating);
        }
    }

    #[test]
    fn failed_only_resumes() {
        assert!(validate(Some(Failed), Resuming).is_ok());
        let err = validate(Some(Failed), Running).unwrap_err();
        assert_eq!(err.valid_transitions, vec![Resuming]);
    }

    #[test]
    fn http_status_codes() {
        assert_eq!(LifecycleErrorCode::PipelineNotFound.http_status(), 404);
        assert_eq!(LifecycleErrorCode::InvalidStatusTransition.http_status(), 400);
    }
}
