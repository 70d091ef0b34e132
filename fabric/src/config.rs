//! Loads a [`Registry`] from a YAML config file listing data origins,
//! grounded in `microdb/config.go`'s `AddDataOriginFromCfg`. Shape follows
//! spec §6 exactly: `table_name -> { schema: {origin_table_ddl,
//! local_table_ddl, insert_query}, connection: {type, dsn} }`.

use std::path::Path;

use serde::Deserialize;

use crate::dataorigin::ConnectionCfg;
use crate::error::Result;
use crate::registry::Registry;
use crate::schema::Schema;

#[derive(Debug, Deserialize)]
struct SchemaEntry {
    #[serde(default)]
    origin_table_ddl: String,
    #[serde(default)]
    local_table_ddl: String,
    #[serde(default)]
    insert_query: String,
}

#[derive(Debug, Deserialize)]
struct OriginEntry {
    schema: SchemaEntry,
    connection: ConnectionCfg,
}

/// Top-level shape of a data-origin config file: table name to its schema
/// and connection info, inlined at the document root.
#[derive(Debug, Deserialize)]
struct DataOriginCfg {
    #[serde(flatten)]
    origins: std::collections::HashMap<String, OriginEntry>,
}

/// Parses a YAML config file and registers every data origin it lists.
pub fn load_into(registry: &mut Registry, path: impl AsRef<Path>) -> Result<()> {
    let contents = std::fs::read_to_string(path)?;
    load_str_into(registry, &contents)
}

pub fn load_str_into(registry: &mut Registry, contents: &str) -> Result<()> {
    let cfg: DataOriginCfg = serde_yaml::from_str(contents)?;
    for (table, entry) in cfg.origins {
        let schema = Schema::new(
            table,
            entry.schema.origin_table_ddl,
            entry.schema.local_table_ddl,
            entry.schema.insert_query,
        );
        registry.add_origin(schema, entry.connection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_origin() {
        let yaml = r#"
users:
  schema:
    origin_table_ddl: "CREATE TABLE users (id INT)"
    local_table_ddl: "CREATE TABLE users (id INTEGER)"
    insert_query: "INSERT INTO users (id) VALUES (?)"
  connection:
    type: mysql
    dsn: "user:pass@tcp(127.0.0.1:3306)/app"
"#;
        let mut registry = Registry::new();
        load_str_into(&mut registry, yaml).unwrap();
        assert_eq!(
            registry.schema("users").unwrap().insert_template,
            "INSERT INTO users (id) VALUES (?)"
        );
    }
}
