//! TOML config file loading and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

use crate::ports::MacAddress;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of every published topic.
    pub base_topic: String,
    pub broker: BrokerConfig,
    pub sensors: SensorsConfig,
    pub irrigation: IrrigationConfig,
    #[serde(default)]
    pub sleep: SleepConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pins: PinsConfig,
    #[serde(default)]
    pub retained: RetainedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    /// Device MACs in polling order; the first is the primary device that
    /// drives the irrigation decision.
    pub devices: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Battery is sampled every this many wake cycles (0 = never).
    #[serde(default = "default_battery_interval")]
    pub battery_interval: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IrrigationConfig {
    #[serde(default = "default_moisture_threshold")]
    pub moisture_threshold_percent: u8,
    #[serde(default = "default_water_threshold")]
    pub water_threshold_percent: f32,
    #[serde(default = "default_pump_duration")]
    pub pump_duration_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepConfig {
    #[serde(default = "default_sleep_minutes")]
    pub sleep_minutes: u64,
    #[serde(default = "default_emergency_timeout")]
    pub emergency_timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Connection attempts for the network link and the broker session
    /// before the cycle continues offline.
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait_sec: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PinsConfig {
    #[serde(default = "default_pump_pin")]
    pub pump: i64,
    #[serde(default = "default_led_pin")]
    pub status_led: i64,
    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetainedConfig {
    #[serde(default = "default_retained_path")]
    pub path: String,
}

// -- serde defaults ---------------------------------------------------------

fn default_broker_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "plantsystem-controller".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_battery_interval() -> u32 {
    6
}
fn default_moisture_threshold() -> u8 {
    50
}
fn default_water_threshold() -> f32 {
    10.0
}
fn default_pump_duration() -> u64 {
    120
}
fn default_sleep_minutes() -> u64 {
    120
}
fn default_emergency_timeout() -> u64 {
    180
}
fn default_retry_max() -> u32 {
    5
}
fn default_retry_wait() -> u64 {
    2
}
fn default_pump_pin() -> i64 {
    17
}
fn default_led_pin() -> i64 {
    27
}
fn default_active_low() -> bool {
    true
}
fn default_retained_path() -> String {
    "retained.json".to_string()
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            sleep_minutes: default_sleep_minutes(),
            emergency_timeout_sec: default_emergency_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retry_max: default_retry_max(),
            retry_wait_sec: default_retry_wait(),
        }
    }
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self {
            pump: default_pump_pin(),
            status_led: default_led_pin(),
            active_low: default_active_low(),
        }
    }
}

impl Default for RetainedConfig {
    fn default() -> Self {
        Self {
            path: default_retained_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// The emergency watchdog must outlast the pump run by at least this much,
/// or a normal watering cycle would trip it.
const WATCHDOG_HEADROOM_SEC: u64 = 30;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_topic_and_broker(&mut errors);
        self.validate_sensors(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_pins(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_topic_and_broker(&self, errors: &mut Vec<String>) {
        if self.base_topic.trim().is_empty() {
            errors.push("base_topic is empty".to_string());
        } else if self.base_topic.ends_with('/') || self.base_topic.starts_with('/') {
            errors.push(format!(
                "base_topic '{}' must not begin or end with '/'",
                self.base_topic
            ));
        } else if self.base_topic.contains(char::is_whitespace) {
            errors.push(format!(
                "base_topic '{}' must not contain whitespace",
                self.base_topic
            ));
        }

        if self.broker.host.trim().is_empty() {
            errors.push("broker.host is empty".to_string());
        }
        if self.broker.port == 0 {
            errors.push("broker.port must be non-zero".to_string());
        }
        if self.broker.client_id.trim().is_empty() {
            errors.push("broker.client_id is empty".to_string());
        }
        if self.broker.username.is_some() != self.broker.password.is_some() {
            errors.push(
                "broker credentials must set both username and password or neither".to_string(),
            );
        }
    }

    fn validate_sensors(&self, errors: &mut Vec<String>) {
        if self.sensors.devices.is_empty() {
            errors.push("sensors.devices is empty — at least the primary device is required".to_string());
        }

        let mut seen: HashSet<MacAddress> = HashSet::new();
        for (i, raw) in self.sensors.devices.iter().enumerate() {
            match raw.parse::<MacAddress>() {
                Ok(mac) => {
                    if !seen.insert(mac) {
                        errors.push(format!("sensors.devices[{i}]: duplicate device {mac}"));
                    }
                }
                Err(e) => errors.push(format!("sensors.devices[{i}]: {e}")),
            }
        }

        if self.sensors.max_retries == 0 {
            errors.push("sensors.max_retries must be at least 1".to_string());
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        if self.irrigation.pump_duration_sec == 0 {
            errors.push("irrigation.pump_duration_sec must be positive".to_string());
        }
        if self.irrigation.moisture_threshold_percent > 100 {
            errors.push(format!(
                "irrigation.moisture_threshold_percent {} out of range [0, 100]",
                self.irrigation.moisture_threshold_percent
            ));
        }
        if !(0.0..=100.0).contains(&self.irrigation.water_threshold_percent) {
            errors.push(format!(
                "irrigation.water_threshold_percent {} out of range [0.0, 100.0]",
                self.irrigation.water_threshold_percent
            ));
        }

        if self.sleep.sleep_minutes == 0 {
            errors.push("sleep.sleep_minutes must be positive".to_string());
        }

        // The pump run blocks the cycle; the watchdog must not fire during a
        // normal watering.
        let min_timeout = self.irrigation.pump_duration_sec + WATCHDOG_HEADROOM_SEC;
        if self.sleep.emergency_timeout_sec < min_timeout {
            errors.push(format!(
                "sleep.emergency_timeout_sec ({}) must be at least pump_duration_sec + {WATCHDOG_HEADROOM_SEC} ({min_timeout})",
                self.sleep.emergency_timeout_sec
            ));
        }

        if self.network.retry_max == 0 {
            errors.push("network.retry_max must be at least 1".to_string());
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        for (name, pin) in [("pins.pump", self.pins.pump), ("pins.status_led", self.pins.status_led)]
        {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "{name}: GPIO {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            }
        }
        if self.pins.pump == self.pins.status_led {
            errors.push(format!(
                "pins.pump and pins.status_led both use GPIO {}",
                self.pins.pump
            ));
        }
    }

    /// Devices in polling order. Only meaningful after [`Config::validate`]
    /// has passed; unparsable entries are dropped.
    pub fn device_macs(&self) -> Vec<MacAddress> {
        self.sensors
            .devices
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helper: build a valid baseline config that passes validation ------

    fn valid_config() -> Config {
        Config {
            base_topic: "plantsystem".into(),
            broker: BrokerConfig {
                host: "192.168.1.10".into(),
                port: 1883,
                client_id: "plantsystem-controller".into(),
                username: None,
                password: None,
            },
            sensors: SensorsConfig {
                devices: vec!["C4:7C:8D:61:37:19".into(), "C4:7C:8D:61:41:02".into()],
                max_retries: 3,
                battery_interval: 6,
            },
            irrigation: IrrigationConfig {
                moisture_threshold_percent: 50,
                water_threshold_percent: 10.0,
                pump_duration_sec: 120,
            },
            sleep: SleepConfig::default(),
            network: NetworkConfig::default(),
            pins: PinsConfig::default(),
            retained: RetainedConfig::default(),
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
base_topic = "plantsystem"

[broker]
host = "192.168.1.10"

[sensors]
devices = ["C4:7C:8D:61:37:19"]

[irrigation]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.base_topic, "plantsystem");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.sensors.max_retries, 3);
        assert_eq!(config.sensors.battery_interval, 6);
        assert_eq!(config.irrigation.pump_duration_sec, 120);
        assert_eq!(config.sleep.sleep_minutes, 120);
        assert_eq!(config.sleep.emergency_timeout_sec, 180);
        config.validate().unwrap();
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
base_topic = "greenhouse/ps1"

[broker]
host = "broker.local"
port = 8883
client_id = "ps1"
username = "u"
password = "p"

[sensors]
devices = ["C4:7C:8D:61:37:19", "c47c8d614102"]
max_retries = 5
battery_interval = 12

[irrigation]
moisture_threshold_percent = 40
water_threshold_percent = 15.0
pump_duration_sec = 90

[sleep]
sleep_minutes = 60
emergency_timeout_sec = 240

[network]
retry_max = 3
retry_wait_sec = 5

[pins]
pump = 22
status_led = 23
active_low = false

[retained]
path = "/var/lib/plantsystem/retained.json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.device_macs().len(), 2);
        assert_eq!(config.pins.pump, 22);
        assert!(!config.pins.active_low);
    }

    // -- Validation: valid configs pass -----------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn single_device_passes() {
        let mut cfg = valid_config();
        cfg.sensors.devices.truncate(1);
        cfg.validate().unwrap();
    }

    // -- Topic / broker ----------------------------------------------------

    #[test]
    fn empty_base_topic_rejected() {
        let mut cfg = valid_config();
        cfg.base_topic = "  ".into();
        assert_validation_err(&cfg, "base_topic is empty");
    }

    #[test]
    fn base_topic_trailing_slash_rejected() {
        let mut cfg = valid_config();
        cfg.base_topic = "plantsystem/".into();
        assert_validation_err(&cfg, "must not begin or end with '/'");
    }

    #[test]
    fn base_topic_with_space_rejected() {
        let mut cfg = valid_config();
        cfg.base_topic = "plant system".into();
        assert_validation_err(&cfg, "whitespace");
    }

    #[test]
    fn empty_broker_host_rejected() {
        let mut cfg = valid_config();
        cfg.broker.host = "".into();
        assert_validation_err(&cfg, "broker.host is empty");
    }

    #[test]
    fn zero_broker_port_rejected() {
        let mut cfg = valid_config();
        cfg.broker.port = 0;
        assert_validation_err(&cfg, "broker.port");
    }

    #[test]
    fn half_credentials_rejected() {
        let mut cfg = valid_config();
        cfg.broker.username = Some("u".into());
        assert_validation_err(&cfg, "both username and password or neither");
    }

    // -- Sensors -----------------------------------------------------------

    #[test]
    fn no_devices_rejected() {
        let mut cfg = valid_config();
        cfg.sensors.devices.clear();
        assert_validation_err(&cfg, "sensors.devices is empty");
    }

    #[test]
    fn malformed_mac_rejected() {
        let mut cfg = valid_config();
        cfg.sensors.devices[1] = "not-a-mac".into();
        assert_validation_err(&cfg, "invalid MAC address");
    }

    #[test]
    fn duplicate_device_rejected() {
        let mut cfg = valid_config();
        // Same address, different spelling.
        cfg.sensors.devices[1] = "c47c8d613719".into();
        assert_validation_err(&cfg, "duplicate device");
    }

    #[test]
    fn zero_retries_rejected() {
        let mut cfg = valid_config();
        cfg.sensors.max_retries = 0;
        assert_validation_err(&cfg, "max_retries must be at least 1");
    }

    #[test]
    fn zero_battery_interval_allowed() {
        // 0 = never sample battery.
        let mut cfg = valid_config();
        cfg.sensors.battery_interval = 0;
        cfg.validate().unwrap();
    }

    // -- Timing ------------------------------------------------------------

    #[test]
    fn zero_pump_duration_rejected() {
        let mut cfg = valid_config();
        cfg.irrigation.pump_duration_sec = 0;
        assert_validation_err(&cfg, "pump_duration_sec must be positive");
    }

    #[test]
    fn moisture_threshold_above_100_rejected() {
        let mut cfg = valid_config();
        cfg.irrigation.moisture_threshold_percent = 101;
        assert_validation_err(&cfg, "moisture_threshold_percent");
    }

    #[test]
    fn water_threshold_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.irrigation.water_threshold_percent = 100.5;
        assert_validation_err(&cfg, "water_threshold_percent");
    }

    #[test]
    fn zero_sleep_minutes_rejected() {
        let mut cfg = valid_config();
        cfg.sleep.sleep_minutes = 0;
        assert_validation_err(&cfg, "sleep_minutes must be positive");
    }

    #[test]
    fn watchdog_without_pump_headroom_rejected() {
        let mut cfg = valid_config();
        cfg.irrigation.pump_duration_sec = 170;
        cfg.sleep.emergency_timeout_sec = 180; // < 170 + 30
        assert_validation_err(&cfg, "pump_duration_sec + 30");
    }

    #[test]
    fn watchdog_headroom_boundary_accepted() {
        let mut cfg = valid_config();
        cfg.irrigation.pump_duration_sec = 150;
        cfg.sleep.emergency_timeout_sec = 180; // exactly 150 + 30
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_network_retries_rejected() {
        let mut cfg = valid_config();
        cfg.network.retry_max = 0;
        assert_validation_err(&cfg, "retry_max must be at least 1");
    }

    // -- Pins ---------------------------------------------------------------

    #[test]
    fn gpio_pin_0_rejected() {
        let mut cfg = valid_config();
        cfg.pins.pump = 0;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn gpio_pin_28_rejected() {
        let mut cfg = valid_config();
        cfg.pins.status_led = 28;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn shared_gpio_pin_rejected() {
        let mut cfg = valid_config();
        cfg.pins.status_led = cfg.pins.pump;
        assert_validation_err(&cfg, "both use GPIO");
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.base_topic = "".into();
        cfg.broker.host = "".into();
        cfg.sensors.devices.clear();
        cfg.irrigation.pump_duration_sec = 0;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        // Should report all violations, not bail after the first
        assert!(msg.contains("base_topic is empty"), "missing topic error in: {msg}");
        assert!(msg.contains("broker.host is empty"), "missing host error in: {msg}");
        assert!(msg.contains("sensors.devices is empty"), "missing devices error in: {msg}");
        assert!(msg.contains("pump_duration_sec"), "missing pump error in: {msg}");
    }

    // -- device_macs --------------------------------------------------------

    #[test]
    fn device_macs_preserve_order() {
        let cfg = valid_config();
        let macs = cfg.device_macs();
        assert_eq!(macs.len(), 2);
        assert_eq!(macs[0].to_string(), "C4:7C:8D:61:37:19");
        assert_eq!(macs[1].to_string(), "C4:7C:8D:61:41:02");
    }
}
