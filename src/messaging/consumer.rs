//! Inbound consumer: decodes input-topic records and hands them to the
//! archiving processor.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::codec::decode_request;
use super::message::InboundRecord;
use super::publisher::StatusPublisher;
use crate::constants::{messages, ProcessingEventType};
use crate::error::{ArchiverError, Result};
use crate::orchestration::command_processor::{ArchivingCommand, ProcessingCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Accepted,
    /// Undecodable; logged and skipped, never retried
    Rejected,
}

pub struct InboundConsumer {
    commands: mpsc::Sender<ArchivingCommand>,
    publisher: Arc<dyn StatusPublisher>,
    counters: Arc<ProcessingCounters>,
}

impl std::fmt::Debug for InboundConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundConsumer")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl InboundConsumer {
    pub fn new(
        commands: mpsc::Sender<ArchivingCommand>,
        publisher: Arc<dyn StatusPublisher>,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        Self {
            commands,
            publisher,
            counters,
        }
    }

    /// Decode one record and forward it.
    ///
    /// Only a closed command channel is an error.
    pub async fn handle(&self, record: InboundRecord) -> Result<InboundOutcome> {
        let request = match decode_request(&record) {
            Ok(request) => request,
            Err(err) => {
                self.counters.record_deserialization_failure();
                warn!(key = %record.key, error = %err, "Failed to deserialize inbound event, skipping");
                let message = messages::exception(format!("Deserialization error: {err}"));
                if let Err(publish_err) = self.publisher.publish_message(&record.key, &message).await {
                    warn!(key = %record.key, error = %publish_err, "Failed to publish message");
                }
                return Ok(InboundOutcome::Rejected);
            }
        };

        debug!(key = %record.key, files = request.file_ids().len(), "Received archival request");
        if let Err(err) = self
            .publisher
            .publish_processing_event(&record.key, ProcessingEventType::Received)
            .await
        {
            warn!(key = %record.key, error = %err, "Failed to publish processing event");
        }

        self.commands
            .send(ArchivingCommand::Archive {
                key: record.key,
                request,
            })
            .await
            .map_err(|_| ArchiverError::channel_closed("inbound_consumer"))?;
        Ok(InboundOutcome::Accepted)
    }

    /// Drain `stream` until it ends or the processor stops accepting commands.
    /// Returns the number of records handled.
    pub async fn run<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = InboundRecord> + Send,
    {
        futures::pin_mut!(stream);
        let mut handled = 0;
        while let Some(record) = stream.next().await {
            let key = record.key.clone();
            match self.handle(record).await {
                Ok(_) => handled += 1,
                Err(err) => {
                    info!(key = %key, error = %err, "Processor stopped, inbound consumer exiting");
                    break;
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::codec::encode_request;
    use crate::testing::{sample_request, RecordingPublisher};

    fn consumer(capacity: usize) -> (InboundConsumer, mpsc::Receiver<ArchivingCommand>, RecordingPublisher) {
        let (tx, rx) = mpsc::channel(capacity);
        let publisher = RecordingPublisher::new();
        let consumer = InboundConsumer::new(
            tx,
            Arc::new(publisher.clone()),
            Arc::new(ProcessingCounters::default()),
        );
        (consumer, rx, publisher)
    }

    #[tokio::test]
    async fn test_decoded_record_is_forwarded() {
        let (consumer, mut rx, publisher) = consumer(4);
        let record = encode_request("k1", &sample_request("k1", &["f1"])).unwrap();

        assert_eq!(consumer.handle(record).await.unwrap(), InboundOutcome::Accepted);
        assert_eq!(publisher.events_for("k1"), vec![ProcessingEventType::Received]);
        match rx.recv().await {
            Some(ArchivingCommand::Archive { key, request }) => {
                assert_eq!(key, "k1");
                assert_eq!(request.file_ids(), vec!["f1"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_record_only_publishes_exception() {
        let (consumer, mut rx, publisher) = consumer(4);

        let outcome = consumer
            .handle(InboundRecord::new("bad", b"not json".to_vec()))
            .await
            .unwrap();

        assert_eq!(outcome, InboundOutcome::Rejected);
        assert!(publisher.events_for("bad").is_empty());
        let trace = publisher.messages_for("bad");
        assert_eq!(trace.len(), 1);
        assert!(trace[0].starts_with("Exception: Deserialization error"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_processor_is_gone() {
        let (consumer, rx, _publisher) = consumer(4);
        drop(rx);

        let records = vec![
            encode_request("a", &sample_request("a", &["f1"])).unwrap(),
            encode_request("b", &sample_request("b", &["f2"])).unwrap(),
        ];
        let handled = consumer.run(futures::stream::iter(records)).await;
        assert_eq!(handled, 0);
    }

    #[tokio::test]
    async fn test_run_drains_stream() {
        let (consumer, mut rx, _publisher) = consumer(8);
        let records = vec![
            encode_request("a", &sample_request("a", &["f1"])).unwrap(),
            InboundRecord::new("b", b"{}".to_vec()),
            encode_request("c", &sample_request("c", &["f3"])).unwrap(),
        ];

        assert_eq!(consumer.run(futures::stream::iter(records)).await, 3);
        let mut forwarded = 0;
        while rx.try_recv().is_ok() {
            forwarded += 1;
        }
        assert_eq!(forwarded, 2);
    }
}
