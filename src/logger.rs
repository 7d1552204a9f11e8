use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::diff::json_changes;

/// What the message log records for telemetry reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every body in full.
    Full,
    /// First read per device in full, later reads as JSON-path changes.
    Diffed,
}

/// NDJSON record of API traffic, one object per line.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    last_read: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            last_read: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        self.record("req", json!({ "method": method, "path": path, "body": body }));
    }

    pub fn log_command(&mut self, action: &str, device: &str, body: &Value) {
        self.record("cmd", json!({ "action": action, "device": device, "body": body }));
    }

    pub fn log_read(&mut self, device: &str, status: u16, body: &Value) {
        let fields = match (&self.mode, self.last_read.get(device)) {
            (MessageLogMode::Full, _) => json!({ "device": device, "status": status, "body": body }),
            (MessageLogMode::Diffed, None) => {
                json!({ "device": device, "status": status, "full": true, "body": body })
            }
            (MessageLogMode::Diffed, Some(prev)) => json!({
                "device": device,
                "status": status,
                "changes": json_changes(prev, body),
            }),
        };
        self.record("read", fields);
        if matches!(self.mode, MessageLogMode::Diffed) {
            self.last_read.insert(device.to_string(), body.clone());
        }
    }

    fn record(&mut self, dir: &str, fields: Value) {
        let mut entry = json!({ "ts": Utc::now().to_rfc3339(), "dir": dir });
        if let (Value::Object(entry), Value::Object(fields)) = (&mut entry, fields) {
            entry.extend(fields);
        }
        match serde_json::to_string(&entry) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{line}") {
                    warn!(error = %e, "failed to write message log entry");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode message log entry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("POST", "/login", None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "POST");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn log_command_captures_device() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_command("set_wave_state", "did-1", &json!({"attrs": {"wave_power": 1}}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "set_wave_state");
        assert_eq!(lines[0]["device"], "did-1");
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        logger.log_read("did-1", 200, &json!({"attr": {"temp_now": 30}}));
        logger.log_read("did-1", 200, &json!({"attr": {"temp_now": 31}}));

        let lines = read_lines(path);
        assert_eq!(lines[0]["full"], true);
        assert!(lines[0]["body"].is_object());
        let changes = lines[1]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["path"], "attr.temp_now");
    }

    #[test]
    fn diffed_mode_tracks_devices_separately() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let body = json!({"attr": {"power": 1}});
        logger.log_read("did-1", 200, &body);
        logger.log_read("did-2", 200, &body);
        logger.log_read("did-1", 200, &body);

        let lines = read_lines(path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["full"], true);
        assert_eq!(lines[2]["changes"].as_array().unwrap().len(), 0);
    }
}
