//! Stats records and the envelope that carries them through a collector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One operation-statistics record, as written to the pipe.
///
/// Serializes to a JSON object with exactly the keys `componentName`,
/// `operation`, `blob` and `value`. `value` is kept ordered by key so two
/// equal records always produce the same line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    component_name: String,
    operation: String,
    blob: String,
    value: BTreeMap<String, String>,
}

impl StatsRecord {
    pub fn new<I, K, V>(
        component_name: impl Into<String>,
        operation: impl Into<String>,
        blob: impl Into<String>,
        value: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let component_name = component_name.into();
        if component_name.is_empty() {
            return Err(Error::EmptyComponentName);
        }
        Ok(Self {
            component_name,
            operation: operation.into(),
            blob: blob.into(),
            value: value
                .into_iter()
                .map(|(key, val)| (key.into(), val.into()))
                .collect(),
        })
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Identifier of the affected object; empty when the operation has none.
    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn value(&self) -> &BTreeMap<String, String> {
        &self.value
    }

    /// Encodes the record as a single JSON line body (no trailing newline).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let record: StatsRecord = serde_json::from_slice(bytes)?;
        if record.component_name.is_empty() {
            return Err(Error::EmptyComponentName);
        }
        Ok(record)
    }
}

/// What a producer hands to a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsMessage {
    /// Written to the pipe as soon as the dumper reaches it.
    Event(StatsRecord),
    /// Reserved for component-level aggregation. The dumper consumes and
    /// discards these; nothing reaches the pipe.
    Accumulate(StatsRecord),
}

impl StatsMessage {
    pub fn record(&self) -> &StatsRecord {
        match self {
            StatsMessage::Event(record) | StatsMessage::Accumulate(record) => record,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, StatsMessage::Event(_))
    }
}
