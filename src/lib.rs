pub mod assets;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod image_processing;
pub mod mcp_server;
pub mod records;
pub mod storage;
#[cfg(test)]
mod stub_backend;
pub mod tools;
pub mod validation;
pub mod watchdog;
pub mod web_pages;
pub mod workflow;
