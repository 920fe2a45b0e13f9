//! Message schema and DBC loader
//!
//! The schema is loaded once at startup and passed by reference to the
//! decoder and the dispatch loop.

pub mod database;
pub mod dbc;

pub use database::{
    ByteOrder, MessageDefinition, MessageSchema, MultiplexerInfo, SchemaStats, SignalDefinition,
    ValueType,
};
