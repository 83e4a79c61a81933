use std::num::NonZeroUsize;

/// Read-only staged-execution policy consumed once per epoch.
///
/// Every predicate here is a pure function of (epoch or step, this config)
/// and must stay that way: all ranks evaluate these branches and any
/// rank-local input would let one worker skip a collective call its peers
/// reach, deadlocking the group. Rank gating (who writes, who evaluates)
/// happens at the call sites, never inside a stop decision.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    /// Evaluate on epochs where `epoch % period == 0`.
    pub accuracy_sample_period: NonZeroUsize,
    /// Epoch after which the stage ends; None runs all configured epochs.
    pub stage_boundary: Option<usize>,
    pub checkpoints_enabled: bool,
    /// Global step index after which the run stops; set from the largest
    /// configured instrumentation step.
    pub instrument_ceiling: Option<u64>,
}

impl StageSchedule {
    pub fn should_evaluate(&self, epoch: usize) -> bool {
        epoch % self.accuracy_sample_period.get() == 0
    }

    pub fn should_checkpoint(&self, epoch: usize) -> bool {
        self.checkpoints_enabled && self.stage_boundary == Some(epoch)
    }

    /// True after the full `epoch` has been processed (checkpoint, if any,
    /// happens first).
    pub fn stage_ends(&self, epoch: usize) -> bool {
        self.stage_boundary == Some(epoch)
    }

    /// True once the step counter has passed the last instrumented step;
    /// the remaining epochs are not worth running at that point.
    pub fn past_ceiling(&self, step: u64) -> bool {
        self.instrument_ceiling.is_some_and(|c| step > c)
    }
}
