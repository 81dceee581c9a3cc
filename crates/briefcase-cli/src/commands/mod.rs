pub mod common;
pub mod forms;
pub mod pull;
pub mod push;
pub mod reports;
