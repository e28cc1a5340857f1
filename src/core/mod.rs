pub mod async_impl;
pub mod compiler;
pub mod config;
pub mod error;
pub mod exec;
pub mod host;
pub mod registry;
pub mod reload;
pub mod runtime;
pub mod schema;
pub mod setter;
pub mod value;
