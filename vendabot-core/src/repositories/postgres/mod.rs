// vendabot-core/src/repositories/postgres/mod.rs

pub mod question_log;
pub mod tenant_connections;
