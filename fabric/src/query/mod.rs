//! Classifies an incoming SQL statement as a read bound for a client's
//! local replica or a write bound for the origin database, and records
//! which tables the statement touches. Grounded in `query/query.go` and
//! `query/parser.go`.

mod parser;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationType {
    Local,
    Origin,
}

/// A parsed statement, classified by type and destination, with the set
/// of tables it requires to execute.
#[derive(Debug, Clone)]
pub struct QueryStmt {
    query_type: QueryType,
    destination_type: DestinationType,
    destination_table: Option<String>,
    required_tables: Vec<String>,
    origin_query: String,
}

/// Parses `sql` and classifies it. SELECT routes to the local replica by
/// default; INSERT and UPDATE route to the origin.
pub fn parse(sql: &str) -> Result<QueryStmt> {
    parser::parse_query(sql)
}

impl QueryStmt {
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    /// Overrides the destination to the local replica. Used by callers
    /// that know a write has already been applied locally via replication
    /// and only need to read it back.
    pub fn on_local(&mut self) -> &mut Self {
        self.destination_type = DestinationType::Local;
        self
    }

    pub fn on_origin(&mut self) -> &mut Self {
        self.destination_type = DestinationType::Origin;
        self
    }

    pub fn sql(&self) -> &str {
        &self.origin_query
    }

    pub fn destination_table(&self) -> Option<&str> {
        self.destination_table.as_deref()
    }

    pub fn required_tables(&self) -> &[String] {
        &self.required_tables
    }
}
