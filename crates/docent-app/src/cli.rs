//! CLI argument definitions for the Docent application.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Docent - a museum guide chatbot that answers from its own document collection.
#[derive(Parser, Debug)]
#[command(name = "docent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory holding the passage database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Ingest every document in this directory before serving.
    #[arg(short = 'i', long = "ingest", value_name = "DIR")]
    pub ingest: Option<PathBuf>,

    /// Exit after ingestion instead of starting the server.
    #[arg(long = "ingest-only")]
    pub ingest_only: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOCENT_CONFIG env var > ~/.docent/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOCENT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > DOCENT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("DOCENT_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Returns `None` if the data directory is not overridden.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level, falling back to the config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".docent").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Parsing ----

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "docent",
            "--port",
            "4000",
            "--ingest",
            "/tmp/docs",
            "--ingest-only",
            "-l",
            "debug",
        ]);
        assert_eq!(args.port, Some(4000));
        assert_eq!(args.ingest, Some(PathBuf::from("/tmp/docs")));
        assert!(args.ingest_only);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_no_flags() {
        let args = CliArgs::parse_from(["docent"]);
        assert!(args.config.is_none());
        assert!(args.ingest.is_none());
        assert!(!args.ingest_only);
    }

    // ---- Resolution ----

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::parse_from(["docent", "--config", "/etc/docent.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/docent.toml"));
    }

    #[test]
    fn test_port_flag_wins() {
        let args = CliArgs::parse_from(["docent", "-p", "5000"]);
        assert_eq!(args.resolve_port(3040), 5000);
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let args = CliArgs::parse_from(["docent"]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
        let args = CliArgs::parse_from(["docent", "--log-level", "trace"]);
        assert_eq!(args.resolve_log_level("warn"), "trace");
    }

    #[test]
    fn test_data_dir_override() {
        let args = CliArgs::parse_from(["docent", "-d", "/var/lib/docent"]);
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/var/lib/docent"));
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/data/docent"), PathBuf::from("/data/docent"));
        assert_eq!(expand_home("relative"), PathBuf::from("relative"));
    }
}
