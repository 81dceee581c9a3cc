//! Record database for pushed forms and instances

mod connection;
mod migrations;
mod record_store;

pub use connection::Database;
pub use record_store::{RecordStore, SqliteRecordStore};
