use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::AnalysisEvent;

use super::{AnalysisRun, RunState};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The run emitted its terminal event.
    Finished,
    Cancelled,
    /// Nobody is listening any more.
    ReceiverClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayOutcome {
    pub reason: StopReason,
    pub events_sent: usize,
    pub intervals_analyzed: usize,
    pub final_state: RunState,
}

/// Forward events from `run` into `sender` until the run ends, the token is
/// cancelled, or the receiver goes away.
///
/// A channel slot is reserved before the next event is computed, so a slow
/// consumer holds back the analysis itself and a cancelled relay never starts
/// another window.
pub async fn relay_events(
    mut run: AnalysisRun,
    sender: mpsc::Sender<AnalysisEvent>,
    cancel_token: CancellationToken,
) -> RelayOutcome {
    let run_id = run.context().run_id;
    let mut events_sent = 0;

    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("run {} cancelled after {} events", run_id, events_sent);
                break StopReason::Cancelled;
            }
            permit = sender.reserve() => {
                let Ok(permit) = permit else {
                    log_warn!("run {}: receiver dropped after {} events", run_id, events_sent);
                    break StopReason::ReceiverClosed;
                };
                let Some(event) = run.next() else {
                    break StopReason::Finished;
                };
                let terminal = event.is_terminal();
                permit.send(event);
                events_sent += 1;
                if terminal {
                    break StopReason::Finished;
                }
            }
        }
    };

    RelayOutcome {
        reason,
        events_sent,
        intervals_analyzed: run.results().len(),
        final_state: run.state(),
    }
}
