//! In-memory executor
//!
//! [`RecordingExecutor`] runs plans without a database: it records every statement,
//! keeps work done inside a transaction apart until it is committed, and can be told
//! to fail on a given statement. The CLI uses it for `--dry-run`; tests use it to
//! check what would have reached PostgreSQL.

use crate::executor::{DdlExecutor, ExecutorError};
use crate::transaction::{TransactionError, TransactionScope, TransactionalExecutor};
use std::cell::RefCell;

/// Something that happened on a [`RecordingExecutor`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Begin,
    Execute(String),
    /// A statement that was rejected by an injected failure
    Failed(String),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct RecordingState {
    events: Vec<RecordedEvent>,
    committed: Vec<String>,
    pending: Option<Vec<String>>,
    attempts: usize,
    fail_on_statement: Option<usize>,
    fail_when_contains: Option<String>,
    fail_on_commit: bool,
}

#[derive(Debug, Default)]
pub struct RecordingExecutor {
    state: RefCell<RecordingState>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th executed statement (1-based, counted across transactions)
    pub fn fail_on_statement(self, n: usize) -> Self {
        self.state.borrow_mut().fail_on_statement = Some(n);
        self
    }

    /// Fail every statement containing `text`
    pub fn fail_when_contains(self, text: impl Into<String>) -> Self {
        self.state.borrow_mut().fail_when_contains = Some(text.into());
        self
    }

    /// Fail every commit; the transaction's work is discarded
    pub fn fail_on_commit(self) -> Self {
        self.state.borrow_mut().fail_on_commit = true;
        self
    }

    /// Statements that are durable: autocommitted or part of a committed transaction
    pub fn committed(&self) -> Vec<String> {
        self.state.borrow().committed.clone()
    }

    /// Statements executed inside the open transaction, if any
    pub fn uncommitted(&self) -> Vec<String> {
        self.state.borrow().pending.clone().unwrap_or_default()
    }

    /// Every statement that executed successfully, committed or not
    pub fn executed(&self) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.state.borrow().events.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    fn finish(&self, commit: bool) -> Result<(), TransactionError> {
        let mut state = self.state.borrow_mut();
        let pending = state.pending.take().ok_or(TransactionError::TransactionClosed)?;

        if commit && state.fail_on_commit {
            state.events.push(RecordedEvent::Rollback);
            return Err(TransactionError::Executor(ExecutorError::Query(
                "injected commit failure".to_string(),
            )));
        }

        if commit {
            state.committed.extend(pending);
            state.events.push(RecordedEvent::Commit);
        } else {
            state.events.push(RecordedEvent::Rollback);
        }
        Ok(())
    }
}

impl DdlExecutor for RecordingExecutor {
    fn execute(&self, sql: &str) -> Result<u64, ExecutorError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        let attempt = state.attempts;

        let injected = state.fail_on_statement == Some(attempt)
            || state
                .fail_when_contains
                .as_deref()
                .is_some_and(|text| sql.contains(text));
        if injected {
            state.events.push(RecordedEvent::Failed(sql.to_string()));
            return Err(ExecutorError::Query(format!(
                "injected failure at statement {attempt}"
            )));
        }

        state.events.push(RecordedEvent::Execute(sql.to_string()));
        match state.pending.as_mut() {
            Some(pending) => pending.push(sql.to_string()),
            None => state.committed.push(sql.to_string()),
        }
        Ok(0)
    }
}

/// An open transaction on a [`RecordingExecutor`]
///
/// Dropping it without committing rolls back.
#[derive(Debug)]
pub struct RecordingTransaction<'a> {
    executor: &'a RecordingExecutor,
    closed: bool,
}

impl DdlExecutor for RecordingTransaction<'_> {
    fn execute(&self, sql: &str) -> Result<u64, ExecutorError> {
        if self.closed {
            return Err(ExecutorError::Other("Transaction is closed".to_string()));
        }
        self.executor.execute(sql)
    }
}

impl TransactionScope for RecordingTransaction<'_> {
    fn commit(mut self) -> Result<(), TransactionError> {
        self.closed = true;
        self.executor.finish(true)
    }

    fn rollback(mut self) -> Result<(), TransactionError> {
        self.closed = true;
        self.executor.finish(false)
    }
}

impl Drop for RecordingTransaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.executor.finish(false) {
                log::warn!("Failed to roll back abandoned transaction: {e}");
            }
        }
    }
}

impl TransactionalExecutor for RecordingExecutor {
    type Transaction<'a> = RecordingTransaction<'a>;

    fn begin(&self) -> Result<RecordingTransaction<'_>, TransactionError> {
        let mut state = self.state.borrow_mut();
        if state.pending.is_some() {
            return Err(TransactionError::Other(
                "a transaction is already open on this executor".to_string(),
            ));
        }
        state.pending = Some(Vec::new());
        state.events.push(RecordedEvent::Begin);

        Ok(RecordingTransaction {
            executor: self,
            closed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autocommit_outside_transaction() {
        let executor = RecordingExecutor::new();
        executor.execute("ANALYZE logs").unwrap();
        assert_eq!(executor.committed(), vec!["ANALYZE logs"]);
        assert!(!executor.in_transaction());
    }

    #[test]
    fn test_commit_makes_work_durable() {
        let executor = RecordingExecutor::new();
        let tx = executor.begin().unwrap();
        tx.execute("CREATE SCHEMA IF NOT EXISTS a").unwrap();
        assert!(executor.committed().is_empty());
        assert_eq!(executor.uncommitted().len(), 1);

        tx.commit().unwrap();
        assert_eq!(executor.committed(), vec!["CREATE SCHEMA IF NOT EXISTS a"]);
        assert_eq!(executor.events().last(), Some(&RecordedEvent::Commit));
    }

    #[test]
    fn test_rollback_and_drop_discard_work() {
        let executor = RecordingExecutor::new();
        let tx = executor.begin().unwrap();
        tx.execute("CREATE TABLE a (id int)").unwrap();
        tx.rollback().unwrap();

        {
            let tx = executor.begin().unwrap();
            tx.execute("CREATE TABLE b (id int)").unwrap();
        }

        assert!(executor.committed().is_empty());
        assert_eq!(executor.executed().len(), 2);
        let rollbacks = executor
            .events()
            .into_iter()
            .filter(|e| *e == RecordedEvent::Rollback)
            .count();
        assert_eq!(rollbacks, 2);
    }

    #[test]
    fn test_injected_failures() {
        let executor = RecordingExecutor::new()
            .fail_on_statement(2)
            .fail_when_contains("DROP");
        assert!(executor.execute("SELECT 1").is_ok());
        assert!(executor.execute("SELECT 2").is_err());
        assert!(executor.execute("DROP TABLE x").is_err());
        assert_eq!(executor.committed(), vec!["SELECT 1"]);
        assert_eq!(executor.events()[1], RecordedEvent::Failed("SELECT 2".to_string()));
    }

    #[test]
    fn test_nested_begin_rejected() {
        let executor = RecordingExecutor::new();
        let _tx = executor.begin().unwrap();
        assert!(executor.begin().is_err());
    }

    #[test]
    fn test_commit_failure_discards_work() {
        let executor = RecordingExecutor::new().fail_on_commit();
        let tx = executor.begin().unwrap();
        tx.execute("CREATE TABLE a (id int)").unwrap();
        assert!(tx.commit().is_err());
        assert!(executor.committed().is_empty());
        assert!(!executor.in_transaction());
    }
}
