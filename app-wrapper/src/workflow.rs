pub mod definition;
pub mod execute;

use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_MAX_CONCURRENT_ACTIVITIES: usize = 8;

#[derive(Deserialize, Clone, Debug)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_concurrent_activities")]
    pub max_concurrent_activities: usize,
    /// handler invoked with the final bindings once the root statement succeeds
    pub post_processing: Option<String>,
    /// parent directory of activity working directories (system temp dir if unset)
    pub work_dir: Option<PathBuf>,
    /// overrides the storage bucket for containers and run indexes
    pub bucket: Option<String>,
}

fn default_max_concurrent_activities() -> usize {
    DEFAULT_MAX_CONCURRENT_ACTIVITIES
}

impl WorkflowConfig {
    pub fn new(
        max_concurrent_activities: Option<usize>,
        post_processing: Option<String>,
        work_dir: Option<PathBuf>,
        bucket: Option<String>,
    ) -> Self {
        Self {
            max_concurrent_activities: max_concurrent_activities
                .unwrap_or(DEFAULT_MAX_CONCURRENT_ACTIVITIES),
            post_processing,
            work_dir,
            bucket,
        }
    }
    pub fn new_by_envy() -> Self {
        envy::prefixed("WORKFLOW_")
            .from_env::<WorkflowConfig>()
            .unwrap_or_else(|e| {
                tracing::info!("workflow config not loaded from env, use default: {:?}", e);
                Self::default()
            })
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
            post_processing: None,
            work_dir: None,
            bucket: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fills_defaults() {
        let conf = WorkflowConfig::new(None, Some("SaveArtifactsV1".to_string()), None, None);
        assert_eq!(conf.max_concurrent_activities, 8);
        assert_eq!(conf.post_processing.as_deref(), Some("SaveArtifactsV1"));
        assert!(conf.work_dir.is_none());
        assert!(conf.bucket.is_none());
    }
}
