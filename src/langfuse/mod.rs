//! Datasets, traces and scores are stored in Langfuse
mod client;
pub mod types;

pub use client::LangfuseClient;
