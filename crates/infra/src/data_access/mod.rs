//! `DataAccess` adapters.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDataAccess;
pub use postgres::PgDataAccess;
