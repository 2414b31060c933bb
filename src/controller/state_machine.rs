//! # Lifecycle State Machine
//!
//! Drives one [`LifecycleHandler`] through the fixed sequence of lifecycle
//! steps. Progress lives in the context's tracker entry; a step that asks for a
//! requeue leaves the state untouched so the next pass resumes at that step.
//!
//! ```text
//! Init -> CheckWorkNeeded -> PreWorkUpdateStatus -> PreWork -> WorkUpdateStatus
//!      -> Work -> WaitWorkDone -> PostWorkUpdateStatus -> PostWork
//!      -> CompleteUpdateStatus -> End
//! ```
//!
//! `CheckWorkNeeded` may jump straight to `End`.

use crate::controller::handler::{HandlerContext, LifecycleHandler};
use crate::controller::result::ReconcileResult;
use crate::crd::LifecycleResource;
use crate::observability;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Init,
    CheckWorkNeeded,
    PreWorkUpdateStatus,
    PreWork,
    WorkUpdateStatus,
    Work,
    WaitWorkDone,
    PostWorkUpdateStatus,
    PostWork,
    CompleteUpdateStatus,
    End,
}

impl MachineState {
    /// Stable label, used in logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MachineState::Init => "init",
            MachineState::CheckWorkNeeded => "check-work-needed",
            MachineState::PreWorkUpdateStatus => "pre-work-update-status",
            MachineState::PreWork => "pre-work",
            MachineState::WorkUpdateStatus => "work-update-status",
            MachineState::Work => "work",
            MachineState::WaitWorkDone => "wait-work-done",
            MachineState::PostWorkUpdateStatus => "post-work-update-status",
            MachineState::PostWork => "post-work",
            MachineState::CompleteUpdateStatus => "complete-update-status",
            MachineState::End => "end",
        }
    }

    /// The state that follows a successful step
    #[must_use]
    pub fn next(self) -> MachineState {
        match self {
            MachineState::Init => MachineState::CheckWorkNeeded,
            MachineState::CheckWorkNeeded => MachineState::PreWorkUpdateStatus,
            MachineState::PreWorkUpdateStatus => MachineState::PreWork,
            MachineState::PreWork => MachineState::WorkUpdateStatus,
            MachineState::WorkUpdateStatus => MachineState::Work,
            MachineState::Work => MachineState::WaitWorkDone,
            MachineState::WaitWorkDone => MachineState::PostWorkUpdateStatus,
            MachineState::PostWorkUpdateStatus => MachineState::PostWork,
            MachineState::PostWork => MachineState::CompleteUpdateStatus,
            MachineState::CompleteUpdateStatus | MachineState::End => MachineState::End,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn transition<K: LifecycleResource>(
    handler: &dyn LifecycleHandler<K>,
    ctx: &HandlerContext<K>,
    to: MachineState,
) {
    let from = ctx.entry.state();
    debug!(
        work = handler.work_name(),
        from = %from,
        to = %to,
        "State transition"
    );
    observability::metrics::increment_state_transitions(handler.work_name(), to.as_str());
    ctx.entry.set_state(to);
}

/// Run the machine until it ends or a step asks for a requeue
pub async fn execute<K: LifecycleResource>(
    handler: &dyn LifecycleHandler<K>,
    ctx: &mut HandlerContext<K>,
) -> ReconcileResult {
    loop {
        let state = ctx.entry.state();
        let next = match state {
            MachineState::End => return ReconcileResult::new(),
            MachineState::Init => state.next(),
            MachineState::CheckWorkNeeded => {
                let (needed, result) = handler.is_work_needed(ctx).await;
                if result.should_requeue() {
                    return result;
                }
                if needed {
                    state.next()
                } else {
                    debug!(work = handler.work_name(), "No work needed");
                    MachineState::End
                }
            }
            MachineState::WaitWorkDone => {
                let (done, result) = handler.is_work_done(ctx).await;
                if result.should_requeue() {
                    return result;
                }
                if !done {
                    return ReconcileResult::short_delay();
                }
                state.next()
            }
            _ => {
                let result = match state {
                    MachineState::PreWorkUpdateStatus => handler.pre_work_update_status(ctx).await,
                    MachineState::PreWork => handler.pre_work(ctx).await,
                    MachineState::WorkUpdateStatus => handler.do_work_update_status(ctx).await,
                    MachineState::Work => handler.do_work(ctx).await,
                    MachineState::PostWorkUpdateStatus => {
                        handler.post_work_update_status(ctx).await
                    }
                    MachineState::PostWork => handler.post_work(ctx).await,
                    _ => handler.work_completed_update_status(ctx).await,
                };
                if result.should_requeue() {
                    return result;
                }
                state.next()
            }
        };
        transition(handler, ctx, next);
    }
}
