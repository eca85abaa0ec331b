pub mod connection;
pub mod models;
pub mod service;

pub use connection::{get_connection, init_schema, DbPool};
pub use models::*;
