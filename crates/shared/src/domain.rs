use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Customer,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: SpeakerRole,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    #[serde(alias = "_id")]
    pub id: CallId,
    #[serde(default)]
    pub caller_name: String,
    #[serde(default)]
    pub caller_number: String,
    #[serde(default)]
    pub callee_name: String,
    #[serde(default)]
    pub callee_number: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_recording_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub transcript: Vec<Utterance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: u64,
    pub pages: u32,
    pub current_page: u32,
    pub limit: u32,
}

impl PaginationMeta {
    pub fn new(total: u64, limit: u32, current_page: u32) -> Self {
        let mut meta = Self {
            total,
            pages: 1,
            current_page,
            limit: limit.max(1),
        };
        meta.set_total(total);
        meta
    }

    pub fn empty(limit: u32) -> Self {
        Self::new(0, limit, 1)
    }

    pub fn pages_for(total: u64, limit: u32) -> u32 {
        let limit = u64::from(limit.max(1));
        let pages = total.div_ceil(limit).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = total;
        self.pages = Self::pages_for(total, self.limit);
        self.current_page = self.current_page.clamp(1, self.pages);
    }

    pub fn increment_total(&mut self) {
        self.set_total(self.total.saturating_add(1));
    }

    pub fn decrement_total(&mut self) {
        self.set_total(self.total.saturating_sub(1));
    }
}
