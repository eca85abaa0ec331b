pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod tools;
