pub mod config;
pub mod encoder;
pub mod logging;
pub mod store;
pub mod text;
pub mod vector;
