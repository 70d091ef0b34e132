//! Versioned wire records exchanged over the bus. Tag numbers are fixed for
//! wire compatibility: a new `Value` variant must get a new, never-reused
//! tag (see DESIGN.md's note on extending `Decimal` to 64 bits).

/// A single SQL column value, tagged by variant.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Value {
    #[prost(oneof = "TypedValue", tags = "1, 2, 3, 4, 5, 6")]
    pub typed_value: Option<TypedValue>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum TypedValue {
    #[prost(string, tag = "1")]
    Varchar(String),
    #[prost(int64, tag = "2")]
    Integer(i64),
    #[prost(float, tag = "3")]
    Decimal(f32),
    #[prost(bool, tag = "4")]
    Boolean(bool),
    #[prost(message, tag = "5")]
    Null(NullValue),
    #[prost(message, tag = "6")]
    Timestamp(prost_types::Timestamp),
}

/// prost has no builtin zero-field message type, so `Null` carries this
/// marker instead of `()`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct NullValue {}

/// One row emitted by a publisher on a table's read topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RowUpdate {
    #[prost(message, repeated, tag = "1")]
    pub row: Vec<Value>,
}

/// A write statement forwarded from a client to a querier over a table's
/// write topic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryRequest {
    #[prost(string, tag = "1")]
    pub query: String,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<Value>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DriverResult {
    #[prost(int64, tag = "1")]
    pub rows_affected: i64,
    #[prost(int64, tag = "2")]
    pub last_insert_id: i64,
}

/// The querier's reply, published to the request's reply inbox.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteQueryReply {
    #[prost(bool, tag = "1")]
    pub ok: bool,
    #[prost(string, tag = "2")]
    pub msg: String,
    #[prost(message, optional, tag = "3")]
    pub result: Option<DriverResult>,
}
