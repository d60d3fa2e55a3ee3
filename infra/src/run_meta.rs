use anyhow::Result;
use momentum_base::error::MomentumError;
use serde::{Deserialize, Serialize};

/// Identity of one workflow run.
///
/// Task handlers receive it as a json string next to their arguments and
/// decode it once through [`RunMeta::from_wire`]; the field names are the
/// wire names shared with the execution substrate.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RunMeta {
    #[serde(rename = "workspaceID")]
    pub workspace_id: String,
    #[serde(rename = "uploadID")]
    pub upload_id: String,
    #[serde(rename = "processorID")]
    pub processor_id: String,
    #[serde(rename = "workflowID")]
    pub workflow_id: String,
    #[serde(rename = "runID")]
    pub run_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

impl RunMeta {
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(wire: &str) -> Result<Self> {
        serde_json::from_str(wire).map_err(|e| {
            MomentumError::InvalidParameter(format!("cannot decode run meta: {:?}", e)).into()
        })
    }
}
