pub mod assembler;
pub mod client;
pub mod config;

pub use client::RelayClient;
