use serde::Serialize;
use serde_json::Value;

use crate::types::*;

/// One leaf-level difference between two JSON documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct JsonChange {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Dotted-path changes from `previous` to `current`. Keys missing on one
/// side are reported against `null`.
pub(crate) fn json_changes(previous: &Value, current: &Value) -> Vec<JsonChange> {
    let mut changes = Vec::new();
    walk(previous, current, "", &mut changes);
    changes
}

fn walk(previous: &Value, current: &Value, prefix: &str, out: &mut Vec<JsonChange>) {
    let (Value::Object(prev), Value::Object(cur)) = (previous, current) else {
        if previous != current {
            out.push(JsonChange {
                path: prefix.to_string(),
                old: previous.clone(),
                new: current.clone(),
            });
        }
        return;
    };

    for (key, cur_val) in cur {
        let path = join(prefix, key);
        match prev.get(key) {
            Some(prev_val) => walk(prev_val, cur_val, &path, out),
            None => walk(&absent(cur_val), cur_val, &path, out),
        }
    }
    for (key, prev_val) in prev {
        if !cur.contains_key(key) {
            walk(prev_val, &absent(prev_val), &join(prefix, key), out);
        }
    }
}

// Missing objects compare as empty so their leaves are listed individually.
fn absent(other: &Value) -> Value {
    if other.is_object() {
        Value::Object(serde_json::Map::new())
    } else {
        Value::Null
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Events for every observed field that differs between two snapshots.
/// `last_fetch` is bookkeeping and never produces an event.
pub(crate) fn diff_states(device_id: &DeviceId, previous: &DeviceState, current: &DeviceState) -> Vec<Event> {
    let mut events = Vec::new();
    if previous.power != current.power {
        events.push(Event::PowerChanged {
            device_id: device_id.clone(),
            on: current.power,
        });
    }
    if previous.current_temperature != current.current_temperature {
        events.push(Event::CurrentTemperatureChanged {
            device_id: device_id.clone(),
            temp: current.current_temperature,
        });
    }
    if previous.target_temperature != current.target_temperature {
        events.push(Event::TargetTemperatureChanged {
            device_id: device_id.clone(),
            target: current.target_temperature,
        });
    }
    if previous.heating_on != current.heating_on {
        events.push(Event::HeatingChanged {
            device_id: device_id.clone(),
            on: current.heating_on,
        });
    }
    if previous.filter_on != current.filter_on {
        events.push(Event::FilterChanged {
            device_id: device_id.clone(),
            on: current.filter_on,
        });
    }
    if previous.waves_on != current.waves_on {
        events.push(Event::WavesChanged {
            device_id: device_id.clone(),
            on: current.waves_on,
        });
    }
    events
}
