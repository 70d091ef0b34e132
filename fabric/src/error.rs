use std::{error::Error, fmt, result};

pub type Result<T, E = FabricError> = result::Result<T, E>;

/// All error values returned by the fabric crate and the roles built on it.
#[derive(Debug)]
pub enum FabricError {
    /// The SQL text could not be parsed at all.
    Parse(String),
    /// A parsed statement is of a kind MicroDB does not route (e.g. DELETE).
    UnsupportedStatement(String),
    /// A SELECT was sent where a write was expected, or vice versa.
    UnsupportedQueryType(String),
    /// No schema or data origin is registered for a table.
    NoSuchTable(String),
    /// A driver DSN string failed to parse.
    InvalidDsn(String),
    /// Dialing the bus failed after exhausting the retry budget.
    BusDial(String),
    /// Publishing to the bus failed after exhausting the retry budget.
    BusPublish(String),
    /// Subscribing to a bus subject failed.
    BusSubscribe(String),
    /// A request/reply call on the bus did not receive a reply in time.
    BusRequestTimeout(String),
    /// Dialing a data origin failed after exhausting the retry budget.
    OriginDial(String),
    /// A query against a data origin failed.
    OriginQuery(String),
    /// The local in-memory replica store returned an error.
    LocalDb(String),
    /// A wire message could not be decoded.
    Decode(String),
    /// A host value could not be unmarshalled from its wire representation.
    Unmarshal(String),
    /// The client's read-topic supervisor channel overflowed; the client is closed.
    ReplicaChannelOverflow,
    /// Internal invariant violation, not expected to occur in practice.
    Internal(String),
}

impl Error for FabricError {}

impl fmt::Display for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FabricError::Parse(s) => write!(f, "failed to parse query: {s}"),
            FabricError::UnsupportedStatement(s) => write!(f, "unsupported statement: {s}"),
            FabricError::UnsupportedQueryType(s) => write!(f, "unsupported query type: {s}"),
            FabricError::NoSuchTable(t) => write!(f, "no such table: {t}"),
            FabricError::InvalidDsn(s) => write!(f, "invalid dsn: {s}"),
            FabricError::BusDial(s) => write!(f, "failed to dial bus: {s}"),
            FabricError::BusPublish(s) => write!(f, "failed to publish to bus: {s}"),
            FabricError::BusSubscribe(s) => write!(f, "failed to subscribe to bus subject: {s}"),
            FabricError::BusRequestTimeout(s) => write!(f, "bus request timed out: {s}"),
            FabricError::OriginDial(s) => write!(f, "failed to dial data origin: {s}"),
            FabricError::OriginQuery(s) => write!(f, "data origin query failed: {s}"),
            FabricError::LocalDb(s) => write!(f, "local database error: {s}"),
            FabricError::Decode(s) => write!(f, "failed to decode wire message: {s}"),
            FabricError::Unmarshal(s) => write!(f, "failed to unmarshal value: {s}"),
            FabricError::ReplicaChannelOverflow => {
                write!(f, "client replica error channel overflowed, client closed")
            }
            FabricError::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl From<sqlparser::parser::ParserError> for FabricError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        FabricError::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for FabricError {
    fn from(e: serde_yaml::Error) -> Self {
        FabricError::Internal(format!("yaml error: {e}"))
    }
}

impl From<std::io::Error> for FabricError {
    fn from(e: std::io::Error) -> Self {
        FabricError::Internal(format!("io error: {e}"))
    }
}

impl From<prost::DecodeError> for FabricError {
    fn from(e: prost::DecodeError) -> Self {
        FabricError::Decode(e.to_string())
    }
}
