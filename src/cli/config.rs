//! Config CLI command.

use crate::Result;
use crate::config::{AppConfig, default_config_path};

/// Config command handler.
pub struct ConfigCommand;

impl ConfigCommand {
    /// Creates a new config command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Renders the effective configuration as commented TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn show(&self, config: &AppConfig) -> Result<String> {
        let origin = match (&config.source, default_config_path()) {
            (Some(path), _) => format!("# Loaded from {}\n", path.display()),
            (None, Some(path)) => format!("# No config file found (looked for {})\n", path.display()),
            (None, None) => "# No config file found\n".to_string(),
        };
        Ok(format!("{origin}\n{}", config.to_toml()?))
    }
}

impl Default for ConfigCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_show_includes_source_and_sections() {
        let config = AppConfig {
            source: Some(PathBuf::from("/etc/alertdedup/config.toml")),
            ..AppConfig::default()
        };
        let text = ConfigCommand::new().show(&config).unwrap();

        assert!(text.starts_with("# Loaded from /etc/alertdedup/config.toml"));
        assert!(text.contains("[dedup]"));
        assert!(text.contains("window_horizon = \"1h\""));
        assert!(text.contains("on_rejected = \"skip\""));
    }
}
