// SPDX-FileCopyrightText: © 2026 CastKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Daemon configuration: TOML file plus `CASTD_` environment overrides.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ControlConfig {
    /// TCP port of the control channel.
    #[serde(default = "default_control_port")]
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { port: default_control_port() }
    }
}

const fn default_control_port() -> u16 {
    7777
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub console_enable: bool,
    #[serde(default = "default_console_level")]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default = "default_log_path")]
    pub file_path: String,
    #[serde(default = "default_file_level")]
    pub file_level: LogLevel,
    #[serde(default = "default_log_format")]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: default_console_level(),
            file_enable: false,
            file_path: default_log_path(),
            file_level: default_file_level(),
            file_format: default_log_format(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_console_level() -> LogLevel {
    LogLevel::Info
}

const fn default_file_level() -> LogLevel {
    LogLevel::Debug
}

fn default_log_path() -> String {
    "logs/castd.log".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Text
}

/// Which filter a [`FilterDef`] instantiates.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterKindDef {
    AudioMixer,
    AudioEncoder,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FilterDef {
    pub id: u32,
    pub kind: FilterKindDef,
    /// Mixer input slots.
    #[serde(default = "default_inputs")]
    pub inputs: usize,
    /// Mixer output channel count.
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Mixer output sample rate.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frame-rate cap for the filter's worker; 0 leaves it unbounded.
    #[serde(default)]
    pub max_fps: u32,
}

const fn default_inputs() -> usize {
    2
}

const fn default_channels() -> u16 {
    2
}

const fn default_sample_rate() -> u32 {
    48_000
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PathDef {
    pub id: u32,
    pub filters: Vec<u32>,
    #[serde(default = "default_endpoint")]
    pub origin_writer: u32,
    #[serde(default = "default_endpoint")]
    pub destination_reader: u32,
}

const fn default_endpoint() -> u32 {
    castkit_core::DEFAULT_ID
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    #[serde(default)]
    pub paths: Vec<PathDef>,
}

/// Loads the configuration: file first, `CASTD_*` variables on top.
pub fn load(path: &str) -> Result<Config, figment::Error> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("CASTD_").split("__"))
        .extract()
}
