//! VALIDATING: reject files that can never be uploaded

use super::{PipelineOrchestrator, RunContext};
use romhold_common::events::{CandidateStatus, RunState};

impl PipelineOrchestrator {
    /// Apply the validator to every candidate; failures are terminal
    pub(super) fn phase_validation(&self, run: &mut RunContext) {
        run.transition(RunState::Validating);

        let mut invalid = 0usize;
        for index in 0..run.candidates.len() {
            let id = run.candidates[index].id;
            run.set_status(id, CandidateStatus::Validating, None);

            match self.validator.validate(&run.candidates[index].file) {
                Ok(()) => run.set_status(id, CandidateStatus::Pending, None),
                Err(e) => {
                    tracing::info!(
                        run_id = %run.run_id(),
                        candidate = %id,
                        file = %run.candidates[index].file.name,
                        reason = e.code(),
                        "File rejected"
                    );
                    run.set_status(id, CandidateStatus::Invalid, Some(e.to_string()));
                    invalid += 1;
                }
            }
        }

        tracing::debug!(
            run_id = %run.run_id(),
            total = run.candidates.len(),
            invalid,
            "Validation complete"
        );
    }
}
