use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://euapi.gizwits.com/app";
pub const DEFAULT_APP_ID: &str = "98754e684ec045528b073876c34c7348";
pub const DEFAULT_LANG: &str = "en";

pub const APP_ID_HEADER: &str = "X-Gizwits-Application-Id";
pub const USER_TOKEN_HEADER: &str = "X-Gizwits-User-token";

pub const BINDINGS_PAGE_SIZE: usize = 20;
pub const BINDINGS_MAX_PAGES: usize = 50;

/// Subset of writable datapoints sent to `POST /control/{did}`.
/// Unset fields are left out of the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlAttrs {
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_flag")]
    pub power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_set: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_flag")]
    pub heat_power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_flag")]
    pub filter_power: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_flag")]
    pub wave_power: Option<bool>,
}

impl ControlAttrs {
    pub fn power_on() -> Self {
        Self {
            power: Some(true),
            ..Default::default()
        }
    }

    /// Full shutdown: power and every pump off in one command.
    pub fn shutdown() -> Self {
        Self {
            power: Some(false),
            heat_power: Some(false),
            filter_power: Some(false),
            wave_power: Some(false),
            ..Default::default()
        }
    }

    pub fn target(target: TargetTemperature) -> Self {
        Self {
            temp_set: Some(target.degrees()),
            ..Default::default()
        }
    }

    pub fn heating_and_filter(on: bool) -> Self {
        Self {
            heat_power: Some(on),
            filter_power: Some(on),
            ..Default::default()
        }
    }

    pub fn heating(on: bool) -> Self {
        Self {
            heat_power: Some(on),
            ..Default::default()
        }
    }

    pub fn filter(on: bool) -> Self {
        Self {
            filter_power: Some(on),
            ..Default::default()
        }
    }

    pub fn waves(on: bool) -> Self {
        Self {
            wave_power: Some(on),
            ..Default::default()
        }
    }

    /// Write the set fields into a cached state.
    pub fn apply_to(&self, state: &mut DeviceState) {
        if let Some(on) = self.power {
            state.power = on;
        }
        if let Some(t) = self.temp_set {
            state.target_temperature = TargetTemperature::from_celsius(f64::from(t));
        }
        if let Some(on) = self.heat_power {
            state.heating_on = on;
        }
        if let Some(on) = self.filter_power {
            state.filter_on = on;
        }
        if let Some(on) = self.wave_power {
            state.waves_on = on;
        }
    }
}

fn ser_flag<S: Serializer>(value: &Option<bool>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(on) => s.serialize_u8(u8::from(*on)),
        None => s.serialize_none(),
    }
}

/// Accepts `true`/`false`, numbers (non-zero = on) and numeric strings.
fn de_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
        Some(Value::String(s)) => match s.as_str() {
            "true" | "on" => Some(true),
            "false" | "off" => Some(false),
            other => other.parse::<f64>().ok().map(|v| v != 0.0),
        },
        _ => None,
    })
}

fn de_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

pub fn control_message(attrs: &ControlAttrs) -> Value {
    json!({ "attrs": attrs })
}

pub fn login_message(username: &str, secret: &str, lang: &str) -> Value {
    json!({
        "username": username,
        "password": secret,
        "lang": lang,
    })
}

/// Same as [`login_message`] with the secret masked, for the message log.
pub fn redacted_login_message(username: &str, lang: &str) -> Value {
    login_message(username, "***", lang)
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct BindingsResponse {
    #[serde(default)]
    pub devices: Vec<BoundDevice>,
}

#[derive(Debug, Deserialize)]
pub struct BoundDevice {
    pub did: String,
}

#[derive(Debug, Default, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    attr: Option<RawAttrs>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttrs {
    #[serde(default, deserialize_with = "de_flag")]
    power: Option<bool>,
    #[serde(default, deserialize_with = "de_number")]
    temp_now: Option<f64>,
    #[serde(default, deserialize_with = "de_number")]
    temp_set: Option<f64>,
    #[serde(default, deserialize_with = "de_flag")]
    heat_power: Option<bool>,
    #[serde(default, deserialize_with = "de_flag")]
    filter_power: Option<bool>,
    #[serde(default, deserialize_with = "de_flag")]
    wave_power: Option<bool>,
}

/// One decoded `devdata/{did}/latest` read.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Online(Reading),
    /// Success response without `attr.power`: the cloud has no live data.
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub power: bool,
    pub current_temperature: Temperature,
    pub target_temperature: TargetTemperature,
    pub heating_on: bool,
    pub filter_on: bool,
    pub waves_on: bool,
}

impl Reading {
    pub fn apply_to(&self, state: &mut DeviceState) {
        state.power = self.power;
        state.current_temperature = self.current_temperature;
        state.target_temperature = self.target_temperature;
        state.heating_on = self.heating_on;
        state.filter_on = self.filter_on;
        state.waves_on = self.waves_on;
    }
}

pub fn parse_latest(body: &Value) -> std::result::Result<Telemetry, serde_json::Error> {
    let resp = LatestResponse::deserialize(body)?;
    let Some(attr) = resp.attr else {
        return Ok(Telemetry::Offline);
    };
    let Some(power) = attr.power else {
        return Ok(Telemetry::Offline);
    };
    let defaults = DeviceState::offline();
    Ok(Telemetry::Online(Reading {
        power,
        current_temperature: attr
            .temp_now
            .map(Temperature::from_celsius)
            .unwrap_or(defaults.current_temperature),
        target_temperature: attr
            .temp_set
            .map(TargetTemperature::from_celsius)
            .unwrap_or(defaults.target_temperature),
        heating_on: attr.heat_power.unwrap_or(false),
        filter_on: attr.filter_power.unwrap_or(false),
        waves_on: attr.wave_power.unwrap_or(false),
    }))
}
