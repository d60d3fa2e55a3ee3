//! Upper bounds applied when validating workflow definitions.

/// Maximum nesting depth of statements
pub const MAX_STATEMENT_DEPTH: usize = 64;

/// Maximum iterations a single loop statement may declare
pub const MAX_LOOP_ITERATIONS: u32 = 10_000;

/// Maximum number of branches in a parallel statement
pub const MAX_PARALLEL_BRANCHES: usize = 256;

/// Maximum length of a task key
pub const MAX_TASK_KEY_LENGTH: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_positive() {
        assert!(MAX_STATEMENT_DEPTH > 0);
        assert!(MAX_LOOP_ITERATIONS > 0);
        assert!(MAX_PARALLEL_BRANCHES > 0);
        assert!(MAX_TASK_KEY_LENGTH > 0);
    }
}
