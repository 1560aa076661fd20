// Configuration module
// Public interface for configuration loading

mod loader;
mod settings;

pub use loader::{default_config_path, load_config, parse_config_str};
pub use settings::{
    CompressionConfig, Config, EvaluatorConfig, LlmConfig, LoggingConfig, PipelineConfig,
    RetrieverConfig, RoleConfig, RolesConfig, StoreConfig,
};
