use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::ParsedRecord;
use crate::schema::quote_identifier;
use crate::sinks::Sink;

/// 📦 One successful `batch_insert`, as the sink saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertedBatch {
    pub database: String,
    pub table: String,
    pub fields: Vec<String>,
    pub records: Vec<ParsedRecord>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashSet<String>,
    ddl: Vec<String>,
    inserted: Vec<InsertedBatch>,
    insert_calls: usize,
    fail_next: usize,
    fail_always: bool,
}

/// 📦 A sink that never forgets, and fails exactly when you ask it to.
///
/// Clone-able because tests need to peek inside after handing a copy to the
/// registry. The `Arc` means every clone shares the same state, so the copy
/// in the test sees every insert the listener made.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    state: Arc<Mutex<State>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💥 Fail the next `n` insert calls, then behave again.
    pub async fn fail_next(&self, n: usize) {
        self.state.lock().await.fail_next = n;
    }

    /// 💀 Fail every insert from now on. A ClickHouse that has left the chat.
    pub async fn fail_always(&self) {
        self.state.lock().await.fail_always = true;
    }

    /// 🔢 Every `batch_insert` call, failed ones included.
    pub async fn insert_calls(&self) -> usize {
        self.state.lock().await.insert_calls
    }

    pub async fn inserted(&self) -> Vec<InsertedBatch> {
        self.state.lock().await.inserted.clone()
    }

    pub async fn ddl_log(&self) -> Vec<String> {
        self.state.lock().await.ddl.clone()
    }

    /// 🏗️ Pretend a table already exists, so no DDL is needed for it.
    pub async fn with_table(self, database: &str, table: &str) -> Self {
        self.state.lock().await.tables.insert(table_key(database, table));
        self
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn table_exists(&self, database: &str, table: &str) -> Result<Option<u64>> {
        let state = self.state.lock().await;
        Ok(state.tables.contains(&table_key(database, table)).then_some(0))
    }

    /// 🏗️ Remembers the statement and, for `CREATE TABLE`, the table it creates.
    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(name) = created_table(statement) {
            state.tables.insert(name.to_string());
        }
        state.ddl.push(statement.to_string());
        Ok(())
    }

    async fn batch_insert(
        &self,
        database: &str,
        table: &str,
        fields: &[&str],
        records: &[ParsedRecord],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert_calls += 1;
        if state.fail_always {
            bail!("💀 in-memory sink is configured to fail every insert");
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            bail!("💀 in-memory sink is configured to fail this insert ({} more to go)", state.fail_next);
        }
        state.inserted.push(InsertedBatch {
            database: database.to_string(),
            table: table.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            records: records.to_vec(),
        });
        Ok(())
    }
}

fn table_key(database: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(database), quote_identifier(table))
}

/// 🔍 The quoted `db`.`table` of a `CREATE TABLE IF NOT EXISTS` statement.
fn created_table(statement: &str) -> Option<&str> {
    statement
        .lines()
        .next()?
        .strip_prefix("CREATE TABLE IF NOT EXISTS ")
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FieldValue;

    fn one_record() -> Vec<ParsedRecord> {
        vec![ParsedRecord::new(vec![FieldValue::Int(1)])]
    }

    #[tokio::test]
    async fn the_one_where_failures_run_out_and_inserts_land() -> Result<()> {
        let sink = InMemorySink::new();
        sink.fail_next(2).await;

        assert!(sink.batch_insert("logs", "t", &["a"], &one_record()).await.is_err());
        assert!(sink.batch_insert("logs", "t", &["a"], &one_record()).await.is_err());
        sink.batch_insert("logs", "t", &["a"], &one_record()).await?;

        assert_eq!(sink.insert_calls().await, 3);
        let inserted = sink.inserted().await;
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].fields, vec!["a".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_fail_always_means_always() {
        let sink = InMemorySink::new();
        sink.fail_always().await;
        for _ in 0..5 {
            assert!(sink.batch_insert("logs", "t", &["a"], &one_record()).await.is_err());
        }
        assert_eq!(sink.insert_calls().await, 5);
        assert!(sink.inserted().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_pre_existing_table_needs_no_ddl() -> Result<()> {
        let sink = InMemorySink::new().with_table("logs", "access").await;
        assert_eq!(sink.table_exists("logs", "access").await?, Some(0));
        assert_eq!(sink.table_exists("logs", "other").await?, None);
        assert!(sink.ddl_log().await.is_empty());
        Ok(())
    }
}
