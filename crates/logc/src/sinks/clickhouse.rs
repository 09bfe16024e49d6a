use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::common::ParsedRecord;
use crate::schema::quote_identifier;
use crate::sinks::Sink;

/// 🔧 Where ClickHouse lives and how long we are willing to wait for it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// 📡 Host of the HTTP interface.
    pub host: String,
    /// 📡 HTTP interface port, 8123 out of the box.
    pub port: u16,
    /// 🔒 Sent as `X-ClickHouse-User`.
    pub username: String,
    /// 🔒 Sent as `X-ClickHouse-Key`. Empty means no key header at all.
    pub password: String,
    /// ⏱️ TCP connect budget, seconds.
    pub connect_timeout_secs: f64,
    /// ⏱️ Whole-request budget for writes, seconds.
    pub write_timeout_secs: f64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8123,
            username: "default".to_string(),
            password: String::new(),
            connect_timeout_secs: 2.0,
            write_timeout_secs: 1.5,
        }
    }
}

impl ClickHouseConfig {
    fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// 📡 ClickHouse over its HTTP interface. Every statement is a POST whose
/// body is the SQL; inserts append their `JSONEachRow` lines after it.
///
/// 🧠 Knowledge graph: I/O only. No buffering, no retries, no batching
/// decisions. The buffer decides what goes, the writer decides how often to
/// try, this struct just does the HTTP.
#[derive(Debug)]
pub(crate) struct ClickHouseSink {
    client: reqwest::Client,
    config: ClickHouseConfig,
    url: String,
}

impl ClickHouseSink {
    /// 🚀 Build the HTTP client. No network traffic happens here.
    pub(crate) fn new(config: ClickHouseConfig) -> Result<Self> {
        let connect = Duration::try_from_secs_f64(config.connect_timeout_secs)
            .context("💀 connect_timeout_secs must be a finite, non-negative number of seconds")?;
        let write = Duration::try_from_secs_f64(config.write_timeout_secs)
            .context("💀 write_timeout_secs must be a finite, non-negative number of seconds")?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(write)
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS, possibly fate.")?;
        let url = config.base_url();
        Ok(Self { client, config, url })
    }

    /// 📡 POST one statement (plus optional payload) and hand back the body.
    ///
    /// Non-2xx is an error carrying the status and whatever ClickHouse said,
    /// which is usually an exception text precise enough to fix the problem.
    async fn post(&self, body: String) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header("X-ClickHouse-User", &self.config.username);
        if !self.config.password.is_empty() {
            request = request.header("X-ClickHouse-Key", &self.config.password);
        }

        let response = request.body(body).send().await.with_context(|| {
            format!(
                "💀 ClickHouse at {} did not answer. Check that it is running and reachable.",
                self.url
            )
        })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("💀 ClickHouse answered {status}: {}", text.trim());
        }
        Ok(text)
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    async fn table_exists(&self, database: &str, table: &str) -> Result<Option<u64>> {
        let query = format!(
            "SELECT total_bytes FROM system.tables WHERE database = {} AND name = {} FORMAT JSONEachRow",
            quote_literal(database),
            quote_literal(table)
        );
        let body = self
            .post(query)
            .await
            .with_context(|| format!("💀 Could not look up table {database}.{table}"))?;
        parse_total_bytes(&body)
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        debug!("🏗️ executing DDL: {statement}");
        self.post(statement.to_string())
            .await
            .context("💀 ClickHouse rejected the DDL statement")?;
        Ok(())
    }

    async fn batch_insert(
        &self,
        database: &str,
        table: &str,
        fields: &[&str],
        records: &[ParsedRecord],
    ) -> Result<()> {
        let body = render_insert(database, table, fields, records)?;
        trace!("📡 inserting {} records ({} bytes) into {database}.{table}", records.len(), body.len());
        self.post(body)
            .await
            .with_context(|| format!("💀 Insert of {} records into {database}.{table} failed", records.len()))?;
        Ok(())
    }
}

/// 📦 `INSERT ... FORMAT JSONEachRow` followed by one JSON object per record.
fn render_insert(database: &str, table: &str, fields: &[&str], records: &[ParsedRecord]) -> Result<String> {
    let columns = fields
        .iter()
        .map(|f| quote_identifier(f))
        .collect::<Vec<_>>()
        .join(", ");
    let mut body = format!(
        "INSERT INTO {}.{} ({}) FORMAT JSONEachRow\n",
        quote_identifier(database),
        quote_identifier(table),
        columns
    );
    for record in records {
        let line = serde_json::to_string(&record.to_json_row(fields))
            .context("💀 A record refused to become JSON")?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(body)
}

/// 🔒 Single-quoted SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// 🔢 `total_bytes` arrives quoted (64-bit ints are strings in ClickHouse
/// JSON), as a bare number, or as null for engines that do not track it.
fn parse_total_bytes(body: &str) -> Result<Option<u64>> {
    let Some(line) = body.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let row: serde_json::Value =
        serde_json::from_str(line).with_context(|| format!("💀 Unreadable system.tables row: {line}"))?;
    let bytes = match row.get("total_bytes") {
        Some(serde_json::Value::String(s)) => s.parse::<u64>().unwrap_or(0),
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    };
    Ok(Some(bytes))
}
