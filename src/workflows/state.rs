//! Session state machine
//!
//! ```text
//! PLANNING -> RESEARCHING -> SYNTHESIZING -> (EVALUATING ->)? PUBLISHING -> DONE
//!                                 ^               |
//!                                 +-- revision ---+
//! any non-terminal state -> FAILED
//! ```

use crate::types::{PipelineError, Result, SessionStatus, Verdict};

/// What the stage that just ran produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Planned,
    Researched,
    Synthesized,
    Evaluated(Verdict),
    Published,
    Failed,
}

/// Facts about the session that routing depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub evaluator_enabled: bool,
    pub revisions_used: u32,
    pub revision_budget: u32,
}

impl TransitionContext {
    pub fn revision_allowed(&self) -> bool {
        self.revisions_used < self.revision_budget
    }
}

/// Compute the next status. Pure; callers persist the result.
pub fn next_status(
    current: SessionStatus,
    outcome: StageOutcome,
    ctx: TransitionContext,
) -> Result<SessionStatus> {
    use SessionStatus as S;
    use StageOutcome as O;

    let next = match (current, outcome) {
        (s, O::Failed) if !s.is_terminal() => S::Failed,
        (S::Planning, O::Planned) => S::Researching,
        (S::Researching, O::Researched) => S::Synthesizing,
        (S::Synthesizing, O::Synthesized) if ctx.evaluator_enabled => S::Evaluating,
        (S::Synthesizing, O::Synthesized) => S::Publishing,
        (S::Evaluating, O::Evaluated(Verdict::NeedsRevision)) if ctx.revision_allowed() => {
            S::Synthesizing
        }
        (S::Evaluating, O::Evaluated(_)) => S::Publishing,
        (S::Publishing, O::Published) => S::Done,
        (current, outcome) => {
            return Err(PipelineError::InvalidTransition(format!(
                "{:?} is not a valid outcome while {}",
                outcome, current
            )));
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ctx(evaluator_enabled: bool, revisions_used: u32) -> TransitionContext {
        TransitionContext {
            evaluator_enabled,
            revisions_used,
            revision_budget: 1,
        }
    }

    #[rstest]
    #[case(SessionStatus::Planning, StageOutcome::Planned, ctx(false, 0), SessionStatus::Researching)]
    #[case(SessionStatus::Researching, StageOutcome::Researched, ctx(false, 0), SessionStatus::Synthesizing)]
    #[case(SessionStatus::Synthesizing, StageOutcome::Synthesized, ctx(false, 0), SessionStatus::Publishing)]
    #[case(SessionStatus::Synthesizing, StageOutcome::Synthesized, ctx(true, 0), SessionStatus::Evaluating)]
    #[case(SessionStatus::Evaluating, StageOutcome::Evaluated(Verdict::Approved), ctx(true, 0), SessionStatus::Publishing)]
    #[case(SessionStatus::Evaluating, StageOutcome::Evaluated(Verdict::NeedsRevision), ctx(true, 0), SessionStatus::Synthesizing)]
    #[case(SessionStatus::Evaluating, StageOutcome::Evaluated(Verdict::NeedsRevision), ctx(true, 1), SessionStatus::Publishing)]
    #[case(SessionStatus::Publishing, StageOutcome::Published, ctx(false, 0), SessionStatus::Done)]
    #[case(SessionStatus::Researching, StageOutcome::Failed, ctx(false, 0), SessionStatus::Failed)]
    #[case(SessionStatus::Publishing, StageOutcome::Failed, ctx(true, 1), SessionStatus::Failed)]
    fn test_transitions(
        #[case] current: SessionStatus,
        #[case] outcome: StageOutcome,
        #[case] ctx: TransitionContext,
        #[case] expected: SessionStatus,
    ) {
        assert_eq!(next_status(current, outcome, ctx).unwrap(), expected);
    }

    #[rstest]
    #[case(SessionStatus::Planning, StageOutcome::Synthesized)]
    #[case(SessionStatus::Done, StageOutcome::Failed)]
    #[case(SessionStatus::Failed, StageOutcome::Planned)]
    #[case(SessionStatus::Synthesizing, StageOutcome::Evaluated(Verdict::Approved))]
    fn test_invalid_transitions(#[case] current: SessionStatus, #[case] outcome: StageOutcome) {
        assert!(matches!(
            next_status(current, outcome, ctx(true, 0)),
            Err(PipelineError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_zero_budget_never_revises() {
        let ctx = TransitionContext {
            evaluator_enabled: true,
            revisions_used: 0,
            revision_budget: 0,
        };
        assert_eq!(
            next_status(
                SessionStatus::Evaluating,
                StageOutcome::Evaluated(Verdict::NeedsRevision),
                ctx
            )
            .unwrap(),
            SessionStatus::Publishing
        );
    }
}
