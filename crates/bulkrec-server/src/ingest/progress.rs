//! In-order progress delivery from a running job to its caller
//!
//! The channel is unbounded so the job never waits on a slow reader. Once the
//! subscriber is gone events are discarded and the job carries on.

use futures::stream::{self, Stream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use bulkrec_common::types::ProgressEvent;

pub fn channel() -> (ProgressPublisher, ProgressSubscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressPublisher {
            tx,
            detached: Arc::new(AtomicBool::new(false)),
        },
        ProgressSubscriber { rx },
    )
}

#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    detached: Arc<AtomicBool>,
}

impl ProgressPublisher {
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() && !self.detached.swap(true, Ordering::Relaxed) {
            debug!("Progress subscriber went away; continuing without it");
        }
    }
}

#[derive(Debug)]
pub struct ProgressSubscriber {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscriber {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Events until the publisher is dropped
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        stream::unfold(self.rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use bulkrec_common::types::{JobPhase, StatusUpdate};
    use futures::StreamExt;
    use uuid::Uuid;

    fn status(message: &str) -> ProgressEvent {
        ProgressEvent::Status(StatusUpdate {
            job_id: Uuid::nil(),
            phase: JobPhase::Normalizing,
            message: message.to_string(),
            sequence: None,
            total_chunks: None,
        })
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (publisher, subscriber) = channel();
        for i in 0..5 {
            publisher.emit(status(&i.to_string()));
        }
        drop(publisher);

        let received: Vec<String> = subscriber
            .into_stream()
            .map(|e| match e {
                ProgressEvent::Status(s) => s.message,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
            .await;
        assert_eq!(received, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_publisher() {
        let (publisher, subscriber) = channel();
        drop(subscriber);
        publisher.emit(status("nobody listening"));
        publisher.emit(status("still fine"));
    }
}
