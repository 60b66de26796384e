//! Progress event emission
//!
//! The pipeline publishes [`PipelineEvent`]s on an optional tokio broadcast
//! channel. Sending never blocks and never fails the run: with no
//! subscribers the event is dropped.

use crate::types::PipelineEvent;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default broadcast buffer
pub const EVENT_BUFFER: usize = 256;

/// Run-scoped event sender
#[derive(Debug, Clone)]
pub struct EventEmitter {
    run_id: Uuid,
    tx: Option<broadcast::Sender<PipelineEvent>>,
}

impl EventEmitter {
    pub fn new(run_id: Uuid, tx: Option<broadcast::Sender<PipelineEvent>>) -> Self {
        Self { run_id, tx }
    }

    /// Emitter that drops everything
    pub fn disabled() -> Self {
        Self::new(Uuid::nil(), None)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Build and publish an event for this run
    pub fn emit(&self, build: impl FnOnce(Uuid) -> PipelineEvent) {
        if let Some(tx) = &self.tx {
            // Err only means nobody is listening
            let _ = tx.send(build(self.run_id));
        }
    }
}

/// Log every event received until the sender side is dropped
///
/// # Arguments
/// * `rx` - Receiver subscribed to the pipeline's event channel
///
/// # Behavior
/// - Lagging receivers log a warning and keep going
/// - Returns when every sender has been dropped
pub async fn log_events(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                PipelineEvent::UnitAnalyzed {
                    unit_id, index, total, ..
                } => info!(unit_id = %unit_id, "Analyzed unit {}/{}", index + 1, total),
                PipelineEvent::UnitSkipped { unit_id, reason, .. } => {
                    warn!(unit_id = %unit_id, reason = %reason, "Unit skipped")
                }
                other => debug!(event = ?other, "Pipeline event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, {} events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_stamps_run_id() {
        let (tx, mut rx) = broadcast::channel(8);
        let run_id = Uuid::new_v4();
        let emitter = EventEmitter::new(run_id, Some(tx));

        emitter.emit(|run_id| PipelineEvent::UnitsDiscovered { run_id, count: 3 });

        match rx.recv().await.unwrap() {
            PipelineEvent::UnitsDiscovered { run_id: got, count } => {
                assert_eq!(got, run_id);
                assert_eq!(count, 3);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        EventEmitter::new(Uuid::new_v4(), Some(tx))
            .emit(|run_id| PipelineEvent::RunFailed { run_id, error: "x".to_string() });
        EventEmitter::disabled()
            .emit(|run_id| PipelineEvent::RunFailed { run_id, error: "x".to_string() });
    }

    #[tokio::test]
    async fn test_log_events_stops_when_sender_dropped() {
        let (tx, rx) = broadcast::channel(8);
        let task = tokio::spawn(log_events(rx));
        let _ = tx.send(PipelineEvent::UnitsDiscovered {
            run_id: Uuid::nil(),
            count: 1,
        });
        drop(tx);
        task.await.unwrap();
    }
}
