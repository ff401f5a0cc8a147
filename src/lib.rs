pub mod cli;
pub mod config;
pub mod dataset;
pub mod eval_tracing;
pub mod evaluations;
pub mod judges;
pub mod langfuse;
pub mod rag;
mod templates;

#[cfg(test)]
mod test_utils;
