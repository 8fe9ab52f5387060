pub mod config;

use clap::{Parser, Subcommand};

/// pointmine: live WebSocket sessions that earn reward points.
#[derive(Debug, Parser)]
#[command(name = "pointmine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults and env overrides) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `PM_CONFIG` (or
/// `config.toml` by default), then apply `PM_*` environment overrides.
/// Returns the resolved [`Config`] and the path that was used.
///
/// A missing file is not an error: every field has a default.
///
/// [`Config`]: pm_domain::config::Config
pub fn load_config() -> anyhow::Result<(pm_domain::config::Config, String)> {
    let config_path = std::env::var("PM_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let mut config = load_config_from(std::path::Path::new(&config_path))?;
    config.apply_env_overrides();
    Ok((config, config_path))
}

/// Parse `path` if it exists, otherwise return the defaults.
pub fn load_config_from(path: &std::path::Path) -> anyhow::Result<pm_domain::config::Config> {
    if !path.exists() {
        return Ok(pm_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.server.port, 3124);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server]\nport = \"nope\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err().to_string();
        assert!(err.contains("bad.toml"), "{err}");
    }

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::parse_from(["pointmine"]);
        assert!(cli.command.is_none());
        let cli = Cli::parse_from(["pointmine", "config", "validate"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Validate))
        ));
    }
}
