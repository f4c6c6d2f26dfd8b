//! Record ⇄ bytes for partition storage.

use crate::Record;
use crate::error::QueueResult;

pub fn encode(record: &Record) -> QueueResult<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

pub fn decode(body: &[u8]) -> QueueResult<Record> {
    Ok(serde_json::from_slice(body)?)
}
