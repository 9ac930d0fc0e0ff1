//! JSON codec for input-topic records.

use super::errors::DeserializationError;
use super::message::InboundRecord;
use crate::models::ArchivalRequest;

pub fn decode_request(record: &InboundRecord) -> Result<ArchivalRequest, DeserializationError> {
    if record.key.trim().is_empty() {
        return Err(DeserializationError::EmptyKey);
    }
    serde_json::from_slice(&record.payload)
        .map_err(|err| DeserializationError::invalid_payload(&record.key, err))
}

pub fn encode_request(
    key: impl Into<String>,
    request: &ArchivalRequest,
) -> Result<InboundRecord, serde_json::Error> {
    Ok(InboundRecord::new(key, serde_json::to_vec(request)?))
}
