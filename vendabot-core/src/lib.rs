// vendabot-core/src/lib.rs

pub mod db;
pub mod error;
pub mod crypto;
pub mod models;
pub mod repositories;
pub mod platforms;
pub mod auth;
pub mod services;
pub mod tasks;

pub use db::Database;
pub use error::Error;
