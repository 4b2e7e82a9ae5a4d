pub mod abuse;
pub mod api;
pub mod app;
pub mod config;
pub mod llm;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod sanitize;
pub mod types;
pub mod ws;
