//Command line interface + boot configuration (radio settings, service knobs)
use crate::errors::CommError;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_RADIO_CHANNEL: u8 = 80;
pub const DEFAULT_RADIO_ADDRESS: u64 = 0xE7E7_E7E7_E7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[repr(u8)]
pub enum Datarate {
    #[serde(rename = "250K")]
    Dr250K = 0,
    #[serde(rename = "1M")]
    Dr1M = 1,
    #[serde(rename = "2M")]
    #[default]
    Dr2M = 2,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub channel: u8,
    pub datarate: Datarate,
    pub address: u64,
    pub power_dbm: i8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_RADIO_CHANNEL,
            datarate: Datarate::Dr2M,
            address: DEFAULT_RADIO_ADDRESS,
            power_dbm: 0,
        }
    }
}

/// Values read once at boot; nothing writes them back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub radio: RadioConfig,
    /// Delay before answering an echo request.
    pub echo_delay_ms: u64,
    pub firmware_name: String,
    pub firmware_version: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            echo_delay_ms: 0,
            firmware_name: "Flight Comm Core".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl CoreConfig {
    /// TOML file (optional) overlaid by `FLIGHT__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, CommError> {
        let mut builder = config::Config::builder();
        if let Some(p) = path {
            builder = builder
                .add_source(config::File::new(&p.to_string_lossy(), config::FileFormat::Toml).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("FLIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CommError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LinkKind {
    Radio,
    Usb,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub peer_addr: String,
    pub link: LinkKind,
    pub log_dir: Option<PathBuf>,
    pub core: CoreConfig,
}

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value = "flight.toml")]     pub config: PathBuf,
    #[arg(long, default_value = "0.0.0.0:19850")]   pub bind_addr: String,
    #[arg(long, default_value = "127.0.0.1:19851")] pub peer_addr: String,
    #[arg(long, value_enum, default_value_t = LinkKind::Radio)]
    pub link: LinkKind,
    #[arg(long)]                                    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn parse_and_build_config() -> Result<Config, CommError> {
        let c = <Cli as Parser>::parse();
        let core = CoreConfig::load(Some(&c.config))?;
        Ok(Config {
            bind_addr: c.bind_addr,
            peer_addr: c.peer_addr,
            link: c.link,
            log_dir: c.log_dir,
            core,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, CoreConfig::default());
        assert_eq!(cfg.radio.channel, 80);
        assert_eq!(cfg.radio.datarate, Datarate::Dr2M);
        assert_eq!(cfg.radio.address, 0xE7E7E7E7E7);
        assert_eq!(cfg.radio.power_dbm, 0);
    }

    #[test]
    fn partial_radio_section_keeps_other_defaults() {
        let cfg = CoreConfig::from_toml_str(
            "echo_delay_ms = 20\n[radio]\nchannel = 42\ndatarate = \"250K\"\n",
        )
        .unwrap();
        assert_eq!(cfg.echo_delay_ms, 20);
        assert_eq!(cfg.radio.channel, 42);
        assert_eq!(cfg.radio.datarate, Datarate::Dr250K);
        assert_eq!(cfg.radio.address, DEFAULT_RADIO_ADDRESS);
    }

    #[test]
    fn bad_datarate_is_a_config_error() {
        let err = CoreConfig::from_toml_str("[radio]\ndatarate = \"9M\"\n").unwrap_err();
        assert!(matches!(err, CommError::Config(_)));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = CoreConfig::load(Some(Path::new("/nonexistent/flight.toml"))).unwrap();
        assert_eq!(cfg.radio.channel, DEFAULT_RADIO_CHANNEL);
    }
}
