//! The `Registry` is the single place a publisher, querier, or client
//! looks up a table's schema and data origin. It replaces the two
//! process-wide globals (`schemaStore`, `dataOrigins`) that the original
//! implementation kept as package-level state, so that multiple
//! independently-configured MicroDB roles can coexist in one process and
//! in tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dataorigin::{ConnectionCfg, DataOrigin};
use crate::error::{FabricError, Result};
use crate::schema::{Schema, SchemaRegistry};

#[derive(Default)]
pub struct Registry {
    schemas: SchemaRegistry,
    origins: HashMap<String, Arc<DataOrigin>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registers a table's schema and data origin together, mirroring
    /// `AddDataOrigin`'s idempotent semantics: a table already present is
    /// left untouched rather than replaced.
    pub fn add_origin(&mut self, schema: Schema, connection: ConnectionCfg) {
        let table = schema.table.clone();
        if self.origins.contains_key(&table) {
            return;
        }
        self.schemas.register(schema.clone());
        self.origins
            .insert(table, Arc::new(DataOrigin::new(schema, connection)));
    }

    pub fn schema(&self, table: &str) -> Result<&Schema> {
        self.schemas.get(table)
    }

    pub fn origin(&self, table: &str) -> Result<Arc<DataOrigin>> {
        self.origins
            .get(table)
            .cloned()
            .ok_or_else(|| FabricError::NoSuchTable(table.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.origins.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataorigin::DataOriginType;

    fn cfg() -> ConnectionCfg {
        ConnectionCfg {
            origin_type: DataOriginType::Sqlite3,
            dsn: ":memory:".to_string(),
        }
    }

    #[test]
    fn add_origin_is_idempotent() {
        let mut reg = Registry::new();
        reg.add_origin(Schema::new("users", "a", "b", "c"), cfg());
        reg.add_origin(Schema::new("users", "x", "y", "z"), cfg());
        assert_eq!(reg.schema("users").unwrap().origin_table_ddl, "a");
    }

    #[test]
    fn unregistered_table_errors() {
        let reg = Registry::new();
        assert!(matches!(reg.origin("ghost"), Err(FabricError::NoSuchTable(_))));
    }
}
