//! briefcase-core - Core library for Briefcase
//!
//! Mirrors forms, media and submissions from an Aggregate server into a local
//! blob store and pushes the mirror back into a record store. The CLI is a
//! thin front end over [`sync::SyncClient`].

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod mirror;
pub mod models;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod util;
pub mod xml;

pub use config::{Credentials, SyncConfig};
pub use error::{Error, Result};
pub use sync::{CancelToken, PushReport, SyncClient, SyncReport};
