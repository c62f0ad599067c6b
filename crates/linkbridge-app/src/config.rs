use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{cli::Cli, error::AppError};

pub const DEFAULT_SERIAL_TCP_PORT: u16 = linkbridge_bridge::DEFAULT_SERIAL_PORT;
pub const DEFAULT_VNC_TCP_PORT: u16 = linkbridge_bridge::DEFAULT_VNC_PORT;
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STUCK_SEND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_VNC_PASSWORD: &str = "password";
const DEFAULT_CONFIG_PATH: &str = "linkbridge.toml";

/// Mirrors the CLI's knobs so the binary is usable unattended under a
/// process supervisor. Every field is optional; `None` means "use the
/// documented default" once merged with the CLI.
#[derive(Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    device: Option<PathBuf>,
    baud: Option<u32>,
    serial_port: Option<u16>,
    vnc_port: Option<u16>,
    vnc_password: Option<String>,
    idle_timeout_secs: Option<u64>,
    stuck_send_timeout_secs: Option<u64>,
}

/// The fully resolved configuration the run loop is built from: config-file
/// values merged with CLI overrides, with documented defaults filling in
/// whatever neither supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub device: Option<PathBuf>,
    pub baud: u32,
    pub serial_port: u16,
    pub vnc_port: u16,
    pub vnc_password: String,
    pub idle_timeout_secs: u64,
    pub stuck_send_timeout_secs: u64,
}

impl Config {
    /// Loads the config file named by `cli.config`, or `linkbridge.toml` in
    /// the working directory if `cli.config` was not given, then overrides
    /// it field-by-field with any CLI flag that was explicitly passed.
    ///
    /// A missing or unparsable default-path file is silent; a missing or
    /// unparsable *explicit* `--config` path is an error.
    pub fn load(cli: &Cli) -> Result<Self, AppError> {
        let raw = match &cli.config {
            Some(path) => read_config(path).map_err(|e| AppError::Config(path.clone(), e))?,
            None => read_config(Path::new(DEFAULT_CONFIG_PATH)).unwrap_or_default(),
        };
        Ok(Self::merge(raw, cli))
    }

    fn merge(raw: RawConfig, cli: &Cli) -> Self {
        Self {
            device: cli.device.clone().or(raw.device),
            baud: cli.baud.or(raw.baud).unwrap_or(DEFAULT_BAUD),
            serial_port: cli.serial_port.or(raw.serial_port).unwrap_or(DEFAULT_SERIAL_TCP_PORT),
            vnc_port: cli.vnc_port.or(raw.vnc_port).unwrap_or(DEFAULT_VNC_TCP_PORT),
            vnc_password: cli
                .vnc_password
                .clone()
                .or(raw.vnc_password)
                .unwrap_or_else(|| DEFAULT_VNC_PASSWORD.to_string()),
            idle_timeout_secs: raw.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            stuck_send_timeout_secs: raw.stuck_send_timeout_secs.unwrap_or(DEFAULT_STUCK_SEND_TIMEOUT_SECS),
        }
    }
}

fn read_config(path: &Path) -> std::io::Result<RawConfig> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["linkbridge"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_apply_when_nothing_is_configured() {
        let config = Config::merge(RawConfig::default(), &cli(&[]));
        assert_eq!(config.serial_port, DEFAULT_SERIAL_TCP_PORT);
        assert_eq!(config.vnc_port, DEFAULT_VNC_TCP_PORT);
        assert_eq!(config.baud, DEFAULT_BAUD);
        assert_eq!(config.vnc_password, DEFAULT_VNC_PASSWORD);
        assert_eq!(config.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
    }

    #[test]
    fn cli_flags_override_config_file_values() {
        let raw = RawConfig { serial_port: Some(2323), vnc_port: Some(5901), ..Default::default() };
        let config = Config::merge(raw, &cli(&["--serial-port", "9000"]));
        assert_eq!(config.serial_port, 9000);
        assert_eq!(config.vnc_port, 5901);
    }

    #[test]
    fn unreadable_default_config_path_falls_back_to_defaults() {
        let config = Config::load(&cli(&[])).unwrap();
        assert_eq!(config.serial_port, DEFAULT_SERIAL_TCP_PORT);
    }

    #[test]
    fn unreadable_explicit_config_path_is_an_error() {
        let err = Config::load(&cli(&["--config", "/nonexistent/linkbridge.toml"])).unwrap_err();
        assert!(matches!(err, AppError::Config(_, _)));
    }

    #[test]
    fn explicit_config_file_is_parsed_and_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkbridge.toml");
        std::fs::write(&path, "serial_port = 2323\nbaud = 57600\n").unwrap();

        let args = cli(&["--config", path.to_str().unwrap()]);
        let config = Config::load(&args).unwrap();
        assert_eq!(config.serial_port, 2323);
        assert_eq!(config.baud, 57600);
        assert_eq!(config.vnc_port, DEFAULT_VNC_TCP_PORT);
    }
}
