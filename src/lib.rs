pub mod core;
pub mod database;
pub mod services;

pub use crate::core::config::Config;
pub use crate::database::{Database, DatabaseError};
