//! Workflow definition tree.
//!
//! A definition is a set of string variables plus a single root
//! [`Statement`]. Each statement node carries exactly one of the five
//! variants; this is checked by [`WorkflowDefinition::validate`] rather than
//! by the type so that definitions keep the `{ "sequence": {..} }` shape on
//! the wire.

pub mod supplement;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    pub root: Statement,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Statement {
    #[serde(
        rename = "task",
        alias = "activity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub task: Option<TaskStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionStatement>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_: Option<LoopStatement>,
}

/// Invocation of one named handler.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatement {
    /// run-unique label; also the RunInfo index key
    pub key: String,
    /// handler name
    pub uses: String,
    /// literal arguments; a string `"$name"` is replaced by the binding `name`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, Value>,
    /// key of the task whose output container is this task's input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// passed to the handler as the `save_output` argument when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_output: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_close_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_start_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to_close_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_initial_interval_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SequenceStatement {
    #[serde(default)]
    pub elements: Vec<Statement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ParallelStatement {
    #[serde(default)]
    pub branches: Vec<Statement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConditionStatement {
    pub variable: String,
    pub value: String,
    pub then: Box<Statement>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub else_: Option<Box<Statement>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatement {
    #[serde(default)]
    pub iterations: u32,
    pub body: Box<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_value: Option<String>,
}

impl Statement {
    pub fn task(task: TaskStatement) -> Self {
        Self {
            task: Some(task),
            ..Default::default()
        }
    }
    pub fn sequence(elements: Vec<Statement>) -> Self {
        Self {
            sequence: Some(SequenceStatement { elements }),
            ..Default::default()
        }
    }
    pub fn parallel(branches: Vec<Statement>) -> Self {
        Self {
            parallel: Some(ParallelStatement { branches }),
            ..Default::default()
        }
    }
    pub fn condition(
        variable: &str,
        value: &str,
        then: Statement,
        else_: Option<Statement>,
    ) -> Self {
        Self {
            condition: Some(ConditionStatement {
                variable: variable.to_string(),
                value: value.to_string(),
                then: Box::new(then),
                else_: else_.map(Box::new),
            }),
            ..Default::default()
        }
    }
    pub fn looping(iterations: u32, body: Statement, break_on: Option<(&str, &str)>) -> Self {
        Self {
            loop_: Some(LoopStatement {
                iterations,
                body: Box::new(body),
                break_variable: break_on.map(|(v, _)| v.to_string()),
                break_value: break_on.map(|(_, v)| v.to_string()),
            }),
            ..Default::default()
        }
    }
}

impl TaskStatement {
    pub fn new(key: &str, uses: &str) -> Self {
        Self {
            key: key.to_string(),
            uses: uses.to_string(),
            ..Default::default()
        }
    }
    pub fn with_arg(mut self, name: &str, value: Value) -> Self {
        self.with.insert(name.to_string(), value);
        self
    }
    pub fn with_input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
        self
    }
}
