//! Database schema for respondents, session state and summaries

pub mod init;

pub use init::init_database;
