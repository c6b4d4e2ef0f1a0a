pub mod config;
pub mod error;
pub mod fs;
pub mod handlers;
pub mod serializer;
pub mod warehouse;
