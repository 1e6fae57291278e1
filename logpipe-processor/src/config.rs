use logpipe_config::load_config;
use logpipe_config::shared::ProcessorConfig;

use crate::error::{ProcessorError, ProcessorResult};

/// Loads the processor configuration and validates it.
pub fn load_processor_config() -> ProcessorResult<ProcessorConfig> {
    let config = load_config::<ProcessorConfig>().map_err(ProcessorError::config)?;
    config.validate().map_err(ProcessorError::config)?;

    Ok(config)
}
