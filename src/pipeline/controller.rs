use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AnalysisConfig;
use crate::events::AnalysisEvent;
use crate::models::RawRow;

use super::stream::{relay_events, RelayOutcome};
use super::AnalysisRun;

pub const DEFAULT_STREAM_CAPACITY: usize = 16;

/// Runs one analysis in the background and hands its events out one at a time.
pub struct StreamController {
    handle: Option<JoinHandle<RelayOutcome>>,
    cancel_token: Option<CancellationToken>,
    receiver: Option<mpsc::Receiver<AnalysisEvent>>,
}

impl StreamController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            receiver: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Validate `config` and start relaying a new run. Must be called inside a tokio runtime.
    pub fn start(&mut self, rows: Vec<RawRow>, config: AnalysisConfig, capacity: usize) -> Result<()> {
        if self.handle.is_some() {
            bail!("analysis stream already active");
        }

        let run = AnalysisRun::new(rows, config).context("invalid analysis config")?;
        info!("starting analysis stream for run {}", run.context().run_id);

        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(relay_events(run, tx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.receiver = Some(rx);
        Ok(())
    }

    /// The next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<AnalysisEvent> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Ask the relay to stop. Events already queued can still be read.
    pub fn cancel(&self) {
        if let Some(token) = &self.cancel_token {
            token.cancel();
            info!("cancel signal sent to analysis stream");
        }
    }

    /// Wait for the relay task and report how it ended.
    pub async fn join(&mut self) -> Result<RelayOutcome> {
        self.cancel_token.take();
        // Unread events would keep the relay waiting for a free slot
        self.receiver.take();

        let Some(handle) = self.handle.take() else {
            bail!("no analysis stream to join");
        };
        handle.await.context("analysis stream task failed to join")
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::pipeline::stream::StopReason;
    use crate::pipeline::RunState;

    fn rows() -> Vec<RawRow> {
        (0..4)
            .map(|i| {
                RawRow::new()
                    .with("device_id", "D1")
                    .with("timestamp", format!("2023-01-01T12:{:02}:00Z", i * 20))
                    .with("state", "NY")
                    .with("latitude", "40.7128")
                    .with("longitude", "-74.0060")
            })
            .collect()
    }

    #[tokio::test]
    async fn streams_a_run_to_completion() {
        let mut controller = StreamController::new();
        controller
            .start(rows(), AnalysisConfig::default(), DEFAULT_STREAM_CAPACITY)
            .unwrap();
        assert!(controller.is_active());

        let mut last = None;
        while let Some(event) = controller.next_event().await {
            last = Some(event.kind);
        }
        let outcome = controller.join().await.unwrap();

        assert_eq!(last, Some(EventType::Completion));
        assert_eq!(outcome.reason, StopReason::Finished);
        assert_eq!(outcome.final_state, RunState::Completed);
        assert_eq!(outcome.intervals_analyzed, 4);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_active() {
        let mut controller = StreamController::new();
        controller.start(rows(), AnalysisConfig::default(), 1).unwrap();

        assert!(controller
            .start(rows(), AnalysisConfig::default(), 1)
            .is_err());

        controller.cancel();
        controller.join().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_never_starts_a_stream() {
        let mut controller = StreamController::new();
        let config = AnalysisConfig {
            confidence_threshold: 1.5,
            ..AnalysisConfig::default()
        };

        assert!(controller.start(rows(), config, 1).is_err());
        assert!(!controller.is_active());
        assert!(controller.next_event().await.is_none());
    }

    #[tokio::test]
    async fn cancel_ends_the_stream_early() {
        let mut controller = StreamController::new();
        controller.start(rows(), AnalysisConfig::default(), 1).unwrap();

        let first = controller.next_event().await.unwrap();
        assert_eq!(first.kind, EventType::DataLoading);
        controller.cancel();

        let outcome = controller.join().await.unwrap();
        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(outcome.intervals_analyzed, 0);
    }
}
