use momentum_infra::run_meta::RunMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Binding environment shared by every branch of a run.
///
/// Writes from concurrent branches are applied in arrival order; the last
/// write to a name wins.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.values.read().await.get(name).cloned()
    }

    pub async fn set(&self, name: impl Into<String>, value: Value) {
        self.values.write().await.insert(name.into(), value);
    }

    pub async fn extend(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.values.write().await.extend(entries);
    }

    /// String comparison used by condition and loop-break checks. Strings
    /// compare as-is, other values by their JSON rendering; unbound names never match.
    pub async fn matches(&self, name: &str, expected: &str) -> bool {
        match self.values.read().await.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => s == expected,
            Some(other) => other.to_string() == expected,
        }
    }

    pub async fn snapshot(&self) -> Map<String, Value> {
        self.values
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Faulted,
    Cancelled,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Faulted => "faulted",
            WorkflowStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub id: Uuid,
    pub meta: Arc<RunMeta>,
    pub status: WorkflowStatus,
    pub bindings: Bindings,
    /// message of the first failing step
    pub error: Option<String>,
}

impl WorkflowContext {
    pub fn new(meta: RunMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            meta: Arc::new(meta),
            status: WorkflowStatus::Pending,
            bindings: Bindings::new(),
            error: None,
        }
    }

    /// Run identifiers as initial bindings.
    pub fn identifier_bindings(meta: &RunMeta) -> Vec<(String, Value)> {
        [
            ("workspace_id", &meta.workspace_id),
            ("upload_id", &meta.upload_id),
            ("processor_id", &meta.processor_id),
            ("file_name", &meta.file_name),
            ("content_type", &meta.content_type),
            ("workflow_id", &meta.workflow_id),
            ("run_id", &meta.run_id),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect()
    }

    pub async fn to_report(&self) -> WorkflowReport {
        WorkflowReport {
            id: self.id.to_string(),
            run_id: self.meta.run_id.clone(),
            status: self.status,
            error: self.error.clone(),
            bindings: self.bindings.snapshot().await,
        }
    }
}

/// Serializable view of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub id: String,
    pub run_id: String,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub bindings: Map<String, Value>,
}
