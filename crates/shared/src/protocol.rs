use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{CallRecord, PaginationMeta},
    error::FrameError,
};

pub const NEW_CALL_FRAME: &str = "new_call";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCallsQuery {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsPageResponse {
    #[serde(default)]
    pub calls: Vec<CallRecord>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewCall(Box<CallRecord>),
    Unrecognized { kind: String },
}

#[derive(Debug, Deserialize)]
struct RawPushFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    call: Option<Value>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Serialize)]
struct NewCallFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    call: &'a CallRecord,
}

pub fn decode_push_frame(text: &str) -> Result<PushEvent, FrameError> {
    let raw: RawPushFrame = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
    let kind = raw.kind.ok_or(FrameError::MissingType)?;

    if kind != NEW_CALL_FRAME {
        return Ok(PushEvent::Unrecognized { kind });
    }

    let body = raw
        .call
        .or(raw.payload)
        .ok_or_else(|| FrameError::MissingPayload { kind: kind.clone() })?;
    let record = serde_json::from_value::<CallRecord>(body)
        .map_err(|source| FrameError::InvalidPayload { kind, source })?;
    Ok(PushEvent::NewCall(Box::new(record)))
}

pub fn encode_new_call_frame(record: &CallRecord) -> serde_json::Result<String> {
    serde_json::to_string(&NewCallFrame {
        kind: NEW_CALL_FRAME,
        call: record,
    })
}
