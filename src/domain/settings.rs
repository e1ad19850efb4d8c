use crate::domain::models::DeviceAddress;
use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_false")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_false(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Which output sinks receive measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Display,
    Inject,
    Both,
}

impl OutputMode {
    pub fn displays(&self) -> bool {
        matches!(self, Self::Display | Self::Both)
    }

    pub fn injects(&self) -> bool {
        matches!(self, Self::Inject | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    Meters,
    Millimeters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Device
    #[serde(default = "default_device_address")]
    pub device_address: DeviceAddress,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: Uuid,

    // Time for the user to press the measure button before connecting
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    // Output
    #[serde(default = "default_output_mode")]
    pub output_mode: OutputMode,
    #[serde(default = "default_unit")]
    pub display_unit: DisplayUnit,
    #[serde(default = "default_unit")]
    pub injection_unit: DisplayUnit,
    #[serde(default = "default_emit_budget_ms")]
    pub emit_budget_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: default_device_address(),
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            startup_delay_ms: default_startup_delay_ms(),
            output_mode: default_output_mode(),
            display_unit: default_unit(),
            injection_unit: default_unit(),
            emit_budget_ms: default_emit_budget_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.device_address,
            service_uuid: self.service_uuid,
            characteristic_uuid: self.characteristic_uuid,
            command: protocol::encode_command().to_vec(),
            emit_budget: Duration::from_millis(self.emit_budget_ms),
        }
    }
}

/// Immutable identifiers a session is built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub address: DeviceAddress,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    /// Written once the subscription has been attempted
    pub command: Vec<u8>,
    /// Output sinks taking longer than this get a warning
    pub emit_budget: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Settings::default().session_config()
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "glm_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_device_address() -> DeviceAddress {
    protocol::DEFAULT_DEVICE_ADDRESS
}
fn default_service_uuid() -> Uuid {
    protocol::SERVICE_UUID
}
fn default_characteristic_uuid() -> Uuid {
    protocol::CHARACTERISTIC_UUID
}
fn default_startup_delay_ms() -> u64 {
    2000
}
fn default_output_mode() -> OutputMode {
    OutputMode::Both
}
fn default_unit() -> DisplayUnit {
    DisplayUnit::Millimeters
}
fn default_emit_budget_ms() -> u64 {
    250
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::open(settings_path))
    }

    /// Load settings from `settings_path`, falling back to defaults.
    /// A missing file is created with the defaults so it can be edited.
    pub fn open(settings_path: PathBuf) -> Self {
        let settings = if settings_path.exists() {
            Self::load_from_file(&settings_path).unwrap_or_else(|e| {
                warn!(
                    "Could not read {}: {:#}. Using defaults.",
                    settings_path.display(),
                    e
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };

        let service = Self {
            settings,
            settings_path,
        };

        if !service.settings_path.exists() {
            match service.save() {
                Ok(()) => info!("Wrote default settings to {}", service.settings_path.display()),
                Err(e) => warn!("Could not write default settings: {:#}", e),
            }
        }

        service
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GlmBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
