use std::fmt;

use chrono::{DateTime, Utc};

/// Water temperature, stored as Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Heating setpoint. Always a whole degree within
/// [`TargetTemperature::MIN`]..=[`TargetTemperature::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetTemperature(u8);

impl TargetTemperature {
    pub const MIN: u8 = 20;
    pub const MAX: u8 = 40;

    /// Clamp and round `c` onto the 1 degree step of the setpoint range.
    pub fn from_celsius(c: f64) -> Self {
        if c.is_nan() {
            return Self(Self::MIN);
        }
        let clamped = c.round().clamp(f64::from(Self::MIN), f64::from(Self::MAX));
        Self(clamped as u8)
    }

    pub fn celsius(&self) -> f64 {
        f64::from(self.0)
    }

    pub fn degrees(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TargetTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\u{00b0}C", self.0)
    }
}

/// Heater/cooler mode as shown to the accessory host. The tub only heats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaterState {
    #[default]
    Inactive,
    Heating,
}

impl HeaterState {
    pub fn from_heating(on: bool) -> Self {
        if on { HeaterState::Heating } else { HeaterState::Inactive }
    }

    pub fn is_heating(&self) -> bool {
        matches!(self, HeaterState::Heating)
    }
}

/// Gizwits device identifier (`did`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Last known state of one tub.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub power: bool,
    pub current_temperature: Temperature,
    pub target_temperature: TargetTemperature,
    pub heating_on: bool,
    pub filter_on: bool,
    pub waves_on: bool,
    pub last_fetch: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// Values reported while the cloud has no live telemetry for the device.
    pub fn offline() -> Self {
        Self {
            power: false,
            current_temperature: Temperature::from_celsius(25.0),
            target_temperature: TargetTemperature::from_celsius(25.0),
            heating_on: false,
            filter_on: false,
            waves_on: false,
            last_fetch: None,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            target_temperature: TargetTemperature::from_celsius(30.0),
            ..Self::offline()
        }
    }
}

/// Static accessory information advertised to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub manufacturer: &'static str,
    pub model: &'static str,
}

pub const ACCESSORY_INFO: AccessoryInfo = AccessoryInfo {
    manufacturer: "Bestway",
    model: "Lay-Z",
};

/// Cache changes, emitted after every mutation of a controller's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PowerChanged { device_id: DeviceId, on: bool },
    CurrentTemperatureChanged { device_id: DeviceId, temp: Temperature },
    TargetTemperatureChanged { device_id: DeviceId, target: TargetTemperature },
    HeatingChanged { device_id: DeviceId, on: bool },
    FilterChanged { device_id: DeviceId, on: bool },
    WavesChanged { device_id: DeviceId, on: bool },
    DeviceOffline { device_id: DeviceId },
}
