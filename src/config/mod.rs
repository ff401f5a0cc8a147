mod api_key;
#[allow(clippy::module_inception)]
mod config;
pub mod defaults;
mod llm_configuration;

pub use api_key::ApiKey;
pub use config::*;
pub use llm_configuration::*;
