//! Strictly sequential motion execution.
//!
//! The waveform unit is shared between axes and is not reentrant, so all
//! motion funnels through one queue: entries run one at a time in
//! submission order, each to its terminal de-energized state, with a
//! settling pause before the next entry touches the hardware. Entries are
//! plain data (axis id + request) so they can be logged and tested
//! without capturing hardware handles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use titrator_traits::Clock;
use tracing::{debug, warn};

use crate::axis::{Axis, MotionOutcome, MotionRequest, StopReason};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisId {
    Burette,
    Valve,
}

impl std::fmt::Display for AxisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisId::Burette => f.write_str("burette"),
            AxisId::Valve => f.write_str("valve"),
        }
    }
}

/// One queued motion, with a label for log context.
#[derive(Debug, Clone, Copy)]
pub struct QueuedCommand {
    pub axis: AxisId,
    pub request: MotionRequest,
    pub label: &'static str,
}

/// The two axes the queue dispatches to.
pub struct AxisSet {
    pub burette: Box<dyn Axis>,
    pub valve: Box<dyn Axis>,
}

impl AxisSet {
    fn get_mut(&mut self, id: AxisId) -> &mut dyn Axis {
        match id {
            AxisId::Burette => self.burette.as_mut(),
            AxisId::Valve => self.valve.as_mut(),
        }
    }
}

pub struct CommandQueue {
    entries: VecDeque<QueuedCommand>,
    settle: Duration,
}

impl CommandQueue {
    pub fn new(settle: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            settle,
        }
    }

    pub fn push(&mut self, axis: AxisId, request: MotionRequest, label: &'static str) {
        self.entries.push_back(QueuedCommand {
            axis,
            request,
            label,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn commands(&self) -> impl Iterator<Item = &QueuedCommand> {
        self.entries.iter()
    }

    /// Drain the queue in FIFO order. A sensor stop is a soft success and
    /// execution continues; a hardware error aborts everything still
    /// queued and surfaces as the queue's result. Remaining entries are
    /// dropped on abort so a retried run starts clean.
    pub fn run(
        &mut self,
        axes: &mut AxisSet,
        clock: &Arc<dyn Clock + Send + Sync>,
    ) -> Result<Vec<MotionOutcome>> {
        let mut outcomes = Vec::with_capacity(self.entries.len());
        let mut first = true;
        while let Some(cmd) = self.entries.pop_front() {
            if !first {
                clock.sleep(self.settle);
            }
            first = false;

            debug!(axis = %cmd.axis, label = cmd.label, request = ?cmd.request, "queue dispatch");
            let outcome = match axes
                .get_mut(cmd.axis)
                .execute(&cmd.request)
                .wrap_err_with(|| format!("{} {}", cmd.axis, cmd.label))
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    let dropped = self.entries.len();
                    self.entries.clear();
                    warn!(label = cmd.label, dropped, "queue aborted");
                    return Err(e);
                }
            };
            if outcome.reason == StopReason::SensorTriggered {
                debug!(
                    axis = %cmd.axis,
                    label = cmd.label,
                    steps = outcome.completed_steps,
                    "motion ended at limit sensor"
                );
            }
            outcomes.push(outcome);
            if outcome.reason == StopReason::Cancelled {
                let dropped = self.entries.len();
                self.entries.clear();
                warn!(label = cmd.label, dropped, "queue cancelled");
                break;
            }
        }
        Ok(outcomes)
    }
}
