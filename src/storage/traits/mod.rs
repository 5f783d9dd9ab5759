//! Storage backend traits.

mod table;

pub use table::TableBackend;
