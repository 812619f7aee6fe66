// vendabot-core/src/platforms/marketplace/mod.rs

pub mod client;

pub use client::{
    ItemAttribute, ItemDetail, MarketplaceApi, MercadoClient, QuestionDetail, QuestionSearchPage,
    TokenGrant,
};
