//! 📐 Table schemas: the ordered list of columns a channel writes into.
//!
//! 🧠 Order is the whole point. A parser emits values positionally, the
//! schema names those positions, and the insert statement lists the columns
//! in the same order. Shuffle one of the three and ClickHouse will happily
//! store a status code in the `uri` column. Ask us how we know. 🦆

use anyhow::{Result, bail};
use serde::Deserialize;

/// 🧱 One column: a name and a ClickHouse type, kept as the literal type string.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// 📐 Ordered column list for one output channel.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// 🏗️ Render a `CREATE TABLE` statement for this schema.
    ///
    /// Pure string assembly: same inputs, same bytes, every time. Bails when
    /// any ingredient is missing, because a table without columns, a name, a
    /// database or an engine is not a table, it is a wish.
    pub fn create_table_ddl(
        &self,
        database: &str,
        table: &str,
        engine: Option<&str>,
    ) -> Result<String> {
        if self.fields.is_empty() {
            bail!("💀 Cannot build DDL for '{database}.{table}': the schema has no fields");
        }
        if database.trim().is_empty() {
            bail!("💀 Cannot build DDL for table '{table}': no database configured");
        }
        if table.trim().is_empty() {
            bail!("💀 Cannot build DDL in database '{database}': no table configured");
        }
        let engine = match engine.map(str::trim) {
            Some(engine) if !engine.is_empty() => engine,
            _ => bail!("💀 Cannot build DDL for '{database}.{table}': no engine configured"),
        };

        let columns = self
            .fields
            .iter()
            .map(|f| format!("    {} {}", quote_identifier(&f.name), f.kind.trim()))
            .collect::<Vec<_>>()
            .join(",\n");

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {}.{}\n(\n{}\n)\nENGINE = {}",
            quote_identifier(database),
            quote_identifier(table),
            columns,
            engine
        ))
    }
}

/// 🔒 Backtick-quote an identifier, doubling any embedded backticks.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_log_schema() -> Schema {
        Schema::new(vec![
            FieldSpec::new("time", "DateTime"),
            FieldSpec::new("uri", "String"),
            FieldSpec::new("status", "UInt16"),
        ])
    }

    #[test]
    fn the_one_where_the_ddl_lists_columns_in_schema_order() -> Result<()> {
        let ddl = access_log_schema().create_table_ddl("logs", "access", Some("MergeTree() ORDER BY time"))?;
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS `logs`.`access`\n(\n    `time` DateTime,\n    `uri` String,\n    `status` UInt16\n)\nENGINE = MergeTree() ORDER BY time"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_asking_twice_gets_the_same_bytes() -> Result<()> {
        let schema = access_log_schema();
        let first = schema.create_table_ddl("logs", "access", Some("Log"))?;
        let second = schema.create_table_ddl("logs", "access", Some("Log"))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn the_one_where_missing_ingredients_spoil_the_ddl() {
        let schema = access_log_schema();
        assert!(schema.create_table_ddl("", "access", Some("Log")).is_err());
        assert!(schema.create_table_ddl("logs", "  ", Some("Log")).is_err());
        assert!(schema.create_table_ddl("logs", "access", None).is_err());
        assert!(schema.create_table_ddl("logs", "access", Some("")).is_err());
        assert!(Schema::default().create_table_ddl("logs", "access", Some("Log")).is_err());
    }

    #[test]
    fn the_one_where_backticks_in_names_are_escaped() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn the_one_where_schema_order_survives_deserialization() {
        #[derive(Deserialize)]
        struct Wrapper {
            schema: Schema,
        }
        let parsed: Wrapper = toml::from_str(
            r#"schema = [ { name = "zeta", type = "String" }, { name = "alpha", type = "UInt8" } ]"#,
        )
        .expect("💀 schema TOML should parse");
        assert_eq!(parsed.schema.field_names(), vec!["zeta", "alpha"]);
    }
}
