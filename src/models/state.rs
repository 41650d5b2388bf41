//! Entry state snapshots observed by consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::ProducerError;

// == Status ==
/// Result status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// Whether the producer is currently running for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Idle,
    Fetching,
}

// == Query State ==
/// Snapshot of an entry's state.
///
/// `data` is present iff `status` is `Success`; `error` is present iff
/// `status` is `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState {
    pub status: QueryStatus,
    pub fetch_status: FetchStatus,
    pub data: Option<Value>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ProducerError>,
    pub data_updated_at: Option<DateTime<Utc>>,
    pub error_updated_at: Option<DateTime<Utc>>,
    /// Number of producer runs started for this entry
    pub fetch_count: u32,
}

impl QueryState {
    /// Initial state of a freshly created entry.
    pub fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            fetch_status: FetchStatus::Idle,
            data: None,
            error: None,
            data_updated_at: None,
            error_updated_at: None,
            fetch_count: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_status == FetchStatus::Fetching
    }

    /// True once the entry holds a terminal result and no fetch is running.
    pub fn is_settled(&self) -> bool {
        !self.is_pending() && !self.is_fetching()
    }

    pub(crate) fn resolve(&mut self, data: Value) {
        self.status = QueryStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.data_updated_at = Some(Utc::now());
    }

    pub(crate) fn reject(&mut self, error: ProducerError) {
        self.status = QueryStatus::Error;
        self.data = None;
        self.error = Some(error);
        self.error_updated_at = Some(Utc::now());
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::pending()
    }
}

fn serialize_error<S>(error: &Option<ProducerError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(err) => serializer.serialize_some(err.message()),
        None => serializer.serialize_none(),
    }
}
