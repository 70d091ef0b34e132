//! Per-table schema: the DDL MicroDB needs at the origin and at a client's
//! local replica, plus the upsert template used to apply replicated rows.

use std::collections::HashMap;

use crate::error::{FabricError, Result};

/// The three SQL fragments a table needs MicroDB to know about.
#[derive(Debug, Clone)]
pub struct Schema {
    pub table: String,
    pub origin_table_ddl: String,
    pub local_table_ddl: String,
    pub insert_template: String,
}

impl Schema {
    pub fn new(
        table: impl Into<String>,
        origin_table_ddl: impl Into<String>,
        local_table_ddl: impl Into<String>,
        insert_template: impl Into<String>,
    ) -> Self {
        Schema {
            table: table.into(),
            origin_table_ddl: origin_table_ddl.into(),
            local_table_ddl: local_table_ddl.into(),
            insert_template: insert_template.into(),
        }
    }
}

/// Maps table name to [`Schema`]. Replaces the process-wide `schemaStore`
/// global of the original implementation with an explicit, constructible
/// object that can be threaded through publisher/querier/client setup and
/// exercised independently in tests.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Registers a table's schema. Idempotent: re-registering the same
    /// table overwrites the previous entry.
    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.table.clone(), schema);
    }

    pub fn get(&self, table: &str) -> Result<&Schema> {
        self.schemas
            .get(table)
            .ok_or_else(|| FabricError::NoSuchTable(table.to_string()))
    }

    pub fn local_table_ddl(&self, table: &str) -> Result<&str> {
        self.get(table).map(|s| s.local_table_ddl.as_str())
    }

    pub fn origin_table_ddl(&self, table: &str) -> Result<&str> {
        self.get(table).map(|s| s.origin_table_ddl.as_str())
    }

    pub fn insert_template(&self, table: &str) -> Result<&str> {
        self.get(table).map(|s| s.insert_template.as_str())
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_table_is_no_such_table() {
        let reg = SchemaRegistry::new();
        assert!(matches!(reg.get("ghost"), Err(FabricError::NoSuchTable(_))));
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let mut reg = SchemaRegistry::new();
        reg.register(Schema::new(
            "users",
            "CREATE TABLE users (id INT, name VARCHAR(255))",
            "CREATE TABLE users (id INTEGER, name TEXT)",
            "INSERT INTO users (id, name) VALUES (?, ?)",
        ));
        assert_eq!(
            reg.insert_template("users").unwrap(),
            "INSERT INTO users (id, name) VALUES (?, ?)"
        );
    }
}
