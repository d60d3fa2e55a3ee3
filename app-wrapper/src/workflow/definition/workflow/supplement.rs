use super::{
    ConditionStatement, LoopStatement, ParallelStatement, SequenceStatement, Statement,
    TaskStatement, WorkflowDefinition,
};
use anyhow::Result;
use momentum_base::error::MomentumError;
use momentum_base::limits::{
    MAX_LOOP_ITERATIONS, MAX_PARALLEL_BRANCHES, MAX_STATEMENT_DEPTH, MAX_TASK_KEY_LENGTH,
};
use momentum_runner::activity::{
    ActivityOptions, RetryPolicy, DEFAULT_ACTIVITY_TIMEOUT, DEFAULT_BACKOFF_COEFFICIENT,
    DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_INTERVAL,
};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum StatementKind<'a> {
    Task(&'a TaskStatement),
    Sequence(&'a SequenceStatement),
    Parallel(&'a ParallelStatement),
    Condition(&'a ConditionStatement),
    Loop(&'a LoopStatement),
}

impl StatementKind<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Task(_) => "task",
            StatementKind::Sequence(_) => "sequence",
            StatementKind::Parallel(_) => "parallel",
            StatementKind::Condition(_) => "condition",
            StatementKind::Loop(_) => "loop",
        }
    }
}

impl Statement {
    /// The single variant this node carries. Empty or ambiguous nodes are schema errors.
    pub fn kind(&self) -> Result<StatementKind<'_>> {
        self.single_kind()
            .map_err(|m| MomentumError::SchemaError(m).into())
    }

    fn single_kind(&self) -> std::result::Result<StatementKind<'_>, String> {
        let mut kinds = Vec::with_capacity(1);
        if let Some(t) = &self.task {
            kinds.push(StatementKind::Task(t));
        }
        if let Some(s) = &self.sequence {
            kinds.push(StatementKind::Sequence(s));
        }
        if let Some(p) = &self.parallel {
            kinds.push(StatementKind::Parallel(p));
        }
        if let Some(c) = &self.condition {
            kinds.push(StatementKind::Condition(c));
        }
        if let Some(l) = &self.loop_ {
            kinds.push(StatementKind::Loop(l));
        }
        match kinds.as_slice() {
            [kind] => Ok(*kind),
            [] => Err("statement has no variant".to_string()),
            many => Err(format!(
                "statement has more than one variant: {}",
                many.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
            )),
        }
    }

    fn validate_at(&self, path: &str, depth: usize, keys: &mut HashSet<String>) -> Result<()> {
        if depth > MAX_STATEMENT_DEPTH {
            return Err(schema_error(path, "statement tree is nested too deeply"));
        }
        let kind = self.single_kind().map_err(|m| schema_error(path, &m))?;
        match kind {
            StatementKind::Task(task) => task.validate_at(path, keys),
            StatementKind::Sequence(seq) => {
                for (i, element) in seq.elements.iter().enumerate() {
                    element.validate_at(&format!("{path}.sequence[{i}]"), depth + 1, keys)?;
                }
                Ok(())
            }
            StatementKind::Parallel(par) => {
                if par.branches.len() > MAX_PARALLEL_BRANCHES {
                    return Err(schema_error(
                        path,
                        &format!("more than {} parallel branches", MAX_PARALLEL_BRANCHES),
                    ));
                }
                for (i, branch) in par.branches.iter().enumerate() {
                    branch.validate_at(&format!("{path}.parallel[{i}]"), depth + 1, keys)?;
                }
                Ok(())
            }
            StatementKind::Condition(cond) => {
                if cond.variable.is_empty() {
                    return Err(schema_error(path, "condition variable is empty"));
                }
                cond.then
                    .validate_at(&format!("{path}.then"), depth + 1, keys)?;
                if let Some(e) = &cond.else_ {
                    e.validate_at(&format!("{path}.else"), depth + 1, keys)?;
                }
                Ok(())
            }
            StatementKind::Loop(lp) => {
                if lp.iterations > MAX_LOOP_ITERATIONS {
                    return Err(schema_error(
                        path,
                        &format!("loop iterations exceed {}", MAX_LOOP_ITERATIONS),
                    ));
                }
                match (&lp.break_variable, &lp.break_value) {
                    (Some(v), Some(_)) if v.is_empty() => {
                        return Err(schema_error(path, "loop breakVariable is empty"));
                    }
                    (Some(_), None) => {
                        return Err(schema_error(path, "loop breakVariable needs a breakValue"));
                    }
                    (None, Some(_)) => {
                        return Err(schema_error(path, "loop breakValue needs a breakVariable"));
                    }
                    _ => {}
                }
                lp.body.validate_at(&format!("{path}.body"), depth + 1, keys)
            }
        }
    }
}

impl TaskStatement {
    fn validate_at(&self, path: &str, keys: &mut HashSet<String>) -> Result<()> {
        if self.key.is_empty() {
            return Err(schema_error(path, "task key is empty"));
        }
        if self.key.len() > MAX_TASK_KEY_LENGTH {
            return Err(schema_error(path, "task key is too long"));
        }
        if self.uses.is_empty() {
            return Err(schema_error(path, &format!("task '{}' has no handler", self.key)));
        }
        if !keys.insert(self.key.clone()) {
            return Err(schema_error(path, &format!("duplicate task key '{}'", self.key)));
        }
        if self.input.as_deref() == Some(self.key.as_str()) {
            return Err(schema_error(
                path,
                &format!("task '{}' names itself as input", self.key),
            ));
        }
        if let Some(c) = self.retry_backoff_coefficient {
            if !c.is_finite() || c < 0.0 {
                return Err(schema_error(
                    path,
                    &format!("task '{}' has an invalid retry backoff coefficient", self.key),
                ));
            }
        }
        Ok(())
    }

    /// Timeouts and retry policy for this task. Absent or zero values take the defaults.
    pub fn activity_options(&self) -> ActivityOptions {
        ActivityOptions {
            schedule_to_close: timeout_or_default(self.schedule_to_close_timeout_seconds),
            schedule_to_start: timeout_or_default(self.schedule_to_start_timeout_seconds),
            start_to_close: timeout_or_default(self.start_to_close_timeout_seconds),
            retry: RetryPolicy {
                max_attempts: self.max_retries.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                initial_interval: self
                    .retry_initial_interval_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_INITIAL_INTERVAL),
                backoff_coefficient: self
                    .retry_backoff_coefficient
                    .filter(|c| *c > 0.0)
                    .unwrap_or(DEFAULT_BACKOFF_COEFFICIENT),
                max_interval: self
                    .retry_max_interval_seconds
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_MAX_INTERVAL),
            },
        }
    }
}

impl WorkflowDefinition {
    /// Structural checks run before anything is scheduled.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        self.root.validate_at("root", 0, &mut keys)
    }
}

fn timeout_or_default(seconds: Option<u64>) -> Duration {
    match seconds {
        Some(s) if s > 0 => Duration::from_secs(s),
        _ => DEFAULT_ACTIVITY_TIMEOUT,
    }
}

fn schema_error(path: &str, message: &str) -> anyhow::Error {
    MomentumError::SchemaError(format!("{path}: {message}")).into()
}
