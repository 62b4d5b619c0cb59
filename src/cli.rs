//! Command-line interface.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Tail Docker container logs and forward error lines to chat webhooks.
#[derive(Parser, Debug)]
#[command(name = "dockwatch")]
#[command(version)]
#[command(about = "Tail Docker container logs and forward error lines to chat webhooks")]
pub struct Cli {
    /// Path to the configuration file (YAML or JSON).
    #[arg(short = 'c', long = "cfg", visible_alias = "config")]
    pub config: PathBuf,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cli_requires_config_path() {
        let result = Cli::try_parse_from(["dockwatch"]);
        assert!(result.is_err(), "-c is mandatory");
    }

    #[test]
    fn cli_short_and_long_forms() {
        let short = Cli::try_parse_from(["dockwatch", "-c", "/etc/dockwatch.yaml"]).unwrap();
        assert_eq!(short.config, PathBuf::from("/etc/dockwatch.yaml"));

        let long = Cli::try_parse_from(["dockwatch", "--cfg", "cfg.json"]).unwrap();
        assert_eq!(long.config, PathBuf::from("cfg.json"));

        let alias = Cli::try_parse_from(["dockwatch", "--config", "cfg.yaml"]).unwrap();
        assert_eq!(alias.config, PathBuf::from("cfg.yaml"));
    }

    #[test]
    fn cli_validate_flag() {
        let cli = Cli::try_parse_from(["dockwatch", "-c", "x.yaml", "--validate"]).unwrap();
        assert!(cli.validate);
    }

    #[test]
    #[serial]
    fn cli_log_format_default_and_flag() {
        temp_env::with_var_unset("LOG_FORMAT", || {
            let cli = Cli::try_parse_from(["dockwatch", "-c", "x.yaml"]).unwrap();
            assert_eq!(cli.log_format, LogFormat::Text);

            let cli =
                Cli::try_parse_from(["dockwatch", "-c", "x.yaml", "--log-format", "json"]).unwrap();
            assert_eq!(cli.log_format, LogFormat::Json);
        });
    }

    #[test]
    fn cli_log_format_invalid_rejected() {
        let result = Cli::try_parse_from(["dockwatch", "-c", "x.yaml", "--log-format", "xml"]);
        assert!(result.is_err(), "Invalid log format should be rejected");
    }

    #[test]
    #[serial]
    fn cli_log_format_from_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["dockwatch", "-c", "x.yaml"]).unwrap();
            assert_eq!(cli.log_format, LogFormat::Json);

            let cli =
                Cli::try_parse_from(["dockwatch", "-c", "x.yaml", "--log-format", "text"]).unwrap();
            assert_eq!(cli.log_format, LogFormat::Text);
        });
    }
}
