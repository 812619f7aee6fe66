// vendabot-core/src/platforms/mod.rs

pub mod marketplace;
pub mod whatsapp;
