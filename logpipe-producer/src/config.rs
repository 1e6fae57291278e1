use anyhow::Context;
use logpipe_config::load_config;
use logpipe_config::shared::ProducerConfig;

/// Loads the producer configuration and validates it.
pub fn load_producer_config() -> anyhow::Result<ProducerConfig> {
    let config =
        load_config::<ProducerConfig>().context("loading producer configuration for startup")?;
    config
        .validate()
        .context("validating producer configuration")?;

    Ok(config)
}
