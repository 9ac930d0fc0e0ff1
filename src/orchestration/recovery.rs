//! # Replay Planning
//!
//! Task state is not persisted. After a restart the registry is rebuilt by
//! replaying the input topic, skipping keys whose processing-event log
//! already shows a terminal event (`FINISHED` or `FAILURE`).

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::constants::ProcessingEventType;
use crate::messaging::message::{BusRecord, InboundRecord, ProcessingEvent};

#[derive(Debug, Default, Clone)]
pub struct RecoveryPlanner {
    last_event: HashMap<String, ProcessingEventType>,
    terminated: HashSet<String>,
}

impl RecoveryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one processing event into the plan
    pub fn observe(&mut self, key: &str, event_type: ProcessingEventType) {
        if event_type.is_terminal() {
            self.terminated.insert(key.to_string());
        }
        self.last_event.insert(key.to_string(), event_type);
    }

    /// Fold a record read back from the processing-status topic.
    /// Returns `false` if the record does not carry a processing event.
    pub fn observe_record(&mut self, record: &BusRecord) -> bool {
        match serde_json::from_value::<ProcessingEvent>(record.payload.clone()) {
            Ok(event) => {
                self.observe(&record.key, event.event_type);
                true
            }
            Err(err) => {
                debug!(key = %record.key, error = %err, "Skipping non-processing record");
                false
            }
        }
    }

    pub fn is_terminated(&self, key: &str) -> bool {
        self.terminated.contains(key)
    }

    pub fn last_event(&self, key: &str) -> Option<ProcessingEventType> {
        self.last_event.get(key).copied()
    }

    /// Keys with processing events but no terminal event, sorted
    pub fn unfinished_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .last_event
            .keys()
            .filter(|key| !self.terminated.contains(*key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Select the input records to re-submit.
    ///
    /// One record per non-terminated key: the latest one, placed at the
    /// position where the key first appeared in the input log.
    pub fn plan<I>(&self, inputs: I) -> Vec<InboundRecord>
    where
        I: IntoIterator<Item = InboundRecord>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, InboundRecord> = HashMap::new();

        for record in inputs {
            if self.terminated.contains(&record.key) {
                continue;
            }
            if !latest.contains_key(&record.key) {
                order.push(record.key.clone());
            }
            latest.insert(record.key.clone(), record);
        }

        let planned: Vec<InboundRecord> = order
            .into_iter()
            .filter_map(|key| latest.remove(&key))
            .collect();
        info!(
            replay = planned.len(),
            terminated = self.terminated.len(),
            "Planned replay of unfinished tasks"
        );
        planned
    }
}
