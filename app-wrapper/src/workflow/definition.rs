pub mod workflow;

use anyhow::{Context, Result};
use momentum_base::error::MomentumError;
use std::path::Path;
use workflow::WorkflowDefinition;

pub struct WorkflowLoader;

impl WorkflowLoader {
    /// Parse a definition given as JSON or YAML, then validate it.
    pub fn load_str(source: &str) -> Result<WorkflowDefinition> {
        let definition = match serde_json::from_str::<WorkflowDefinition>(source) {
            Ok(def) => def,
            Err(json_err) => serde_yaml::from_str::<WorkflowDefinition>(source).map_err(|yaml_err| {
                tracing::debug!("not a json definition: {:?}", json_err);
                MomentumError::SchemaError(format!(
                    "cannot parse workflow definition as json ({}) or yaml ({})",
                    json_err, yaml_err
                ))
            })?,
        };
        definition.validate()?;
        Ok(definition)
    }

    pub async fn load_path(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading workflow definition {}", path.display()))?;
        Self::load_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::workflow::{Statement, TaskStatement};
    use super::*;
    use serde_json::json;

    fn all_kinds() -> WorkflowDefinition {
        WorkflowDefinition {
            variables: [("x".to_string(), "42".to_string())].into_iter().collect(),
            root: Statement::sequence(vec![
                Statement::task(
                    TaskStatement::new("a", "Passthrough")
                        .with_arg("n", json!("$x"))
                        .with_arg("limit", json!(3)),
                ),
                Statement::parallel(vec![
                    Statement::task(TaskStatement::new("b", "Echo").with_input("a")),
                    Statement::task(TaskStatement::new("c", "Echo")),
                ]),
                Statement::condition(
                    "bresult",
                    "ok",
                    Statement::task(TaskStatement::new("d", "Echo")),
                    Some(Statement::task(TaskStatement::new("e", "Echo"))),
                ),
                Statement::looping(
                    3,
                    Statement::task(TaskStatement::new("f", "Echo")),
                    Some(("fresult", "done")),
                ),
            ]),
        }
    }

    #[test]
    fn test_json_and_yaml_preserve_tree() {
        let def = all_kinds();
        let json = serde_json::to_string_pretty(&def).unwrap();
        assert_eq!(WorkflowLoader::load_str(&json).unwrap(), def);

        let yaml = serde_yaml::to_string(&def).unwrap();
        assert_eq!(WorkflowLoader::load_str(&yaml).unwrap(), def);
    }

    #[test]
    fn test_activity_alias_and_wire_names() {
        let source = r#"
variables:
  who: world
root:
  loop:
    iterations: 2
    breakVariable: greetresult
    breakValue: hi
    body:
      activity:
        key: greet
        uses: Echo
        with:
          name: $who
        maxRetries: 5
"#;
        let def = WorkflowLoader::load_str(source).unwrap();
        let lp = def.root.loop_.as_ref().unwrap();
        assert_eq!(lp.break_variable.as_deref(), Some("greetresult"));
        let task = lp.body.task.as_ref().unwrap();
        assert_eq!(task.uses, "Echo");
        assert_eq!(task.max_retries, Some(5));
        assert_eq!(task.with.get("name"), Some(&json!("$who")));

        let back = serde_json::to_value(&def).unwrap();
        assert!(back["root"]["loop"]["body"].get("task").is_some());
        assert!(back["root"]["loop"]["body"].get("activity").is_none());
    }

    #[test]
    fn test_unparsable_source_is_schema_error() {
        let err = WorkflowLoader::load_str("root: [unclosed").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::SchemaError(_))
        ));
        // parses, but fails validation
        let err = WorkflowLoader::load_str(r#"{"root": {}}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MomentumError>(),
            Some(MomentumError::SchemaError(_))
        ));
    }

    #[tokio::test]
    async fn test_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        let json = serde_json::to_string(&all_kinds()).unwrap();
        tokio::fs::write(&path, json).await.unwrap();
        let def = WorkflowLoader::load_path(&path).await.unwrap();
        assert_eq!(def, all_kinds());
        assert!(WorkflowLoader::load_path(dir.path().join("missing.json"))
            .await
            .is_err());
    }
}
