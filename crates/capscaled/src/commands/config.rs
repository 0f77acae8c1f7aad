use capscale_core::CapscaleConfig;

/// Print the default configuration.
pub fn init() -> anyhow::Result<()> {
    print!("{}", CapscaleConfig::default().to_toml_string()?);
    Ok(())
}

/// Print the effective configuration. Credentials are never rendered.
pub fn show(config: &CapscaleConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
