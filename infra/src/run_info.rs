use crate::run_meta::RunMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod repository;

pub const RUN_INFO_CONTENT_TYPE: &str = "application/json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// path relative to the output directory of the producing task
    pub name: String,
    pub size: i64,
    /// extension with its leading dot, empty when the name has none
    pub ext: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInfo {
    pub activity_key: String,
    pub data_container_id: String,
    pub num_files: i64,
    pub num_bytes: i64,
    #[serde(rename = "fileNames", default)]
    pub files: Vec<FileInfo>,
}

/// Per-run index of what each completed task produced, persisted as
/// `<runID>.info` next to the data containers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub workflow_id: String,
    pub run_id: String,
    pub upload_id: String,
    pub workspace_id: String,
    pub processor_id: String,
    #[serde(default)]
    pub activity_info_map: BTreeMap<String, ActivityInfo>,
}

impl RunInfo {
    pub fn empty_for(meta: &RunMeta) -> Self {
        Self {
            workflow_id: meta.workflow_id.clone(),
            run_id: meta.run_id.clone(),
            upload_id: meta.upload_id.clone(),
            workspace_id: meta.workspace_id.clone(),
            processor_id: meta.processor_id.clone(),
            activity_info_map: BTreeMap::new(),
        }
    }

    pub fn object_key(run_id: &str) -> String {
        format!("{}.info", run_id)
    }

    pub fn activity(&self, key: &str) -> Option<&ActivityInfo> {
        self.activity_info_map.get(key)
    }

    /// Overwrites any previous entry of the same task.
    pub fn upsert(&mut self, info: ActivityInfo) {
        self.activity_info_map
            .insert(info.activity_key.clone(), info);
    }
}
