use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::MessageLogger;
use crate::protocol::{
    control_message, login_message, parse_latest, redacted_login_message, BindingsResponse,
    BoundDevice, ControlAttrs, LoginResponse, Telemetry, APP_ID_HEADER, USER_TOKEN_HEADER,
};
use crate::types::DeviceId;
use crate::{Error, Result};

/// HTTP side of the Gizwits app API. Cheap to clone; clones share the
/// session token and the message log.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    token: Arc<RwLock<String>>,
    logger: Option<Arc<Mutex<MessageLogger>>>,
}

impl ApiClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: String,
        app_id: String,
        logger: Option<MessageLogger>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id,
            token: Arc::new(RwLock::new(String::new())),
            logger: logger.map(|l| Arc::new(Mutex::new(l))),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        !self.token.read().is_empty()
    }

    pub(crate) fn set_token(&self, token: String) {
        *self.token.write() = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn log(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(ref logger) = self.logger {
            f(&mut logger.lock());
        }
    }

    pub(crate) async fn login(&self, username: &str, secret: &str, lang: &str) -> Result<String> {
        let url = self.url("login");
        debug!(url = %url, "logging in");
        self.log(|l| l.log_request("POST", "/login", Some(&redacted_login_message(username, lang))));

        let resp = self
            .http
            .post(&url)
            .header(APP_ID_HEADER, &self.app_id)
            .json(&login_message(username, secret, lang))
            .send()
            .await?;
        let resp = check_status(resp, "login")?;
        let body: LoginResponse = resp.json().await?;
        Ok(body.token)
    }

    pub(crate) async fn bindings(&self, limit: usize, skip: usize) -> Result<Vec<BoundDevice>> {
        let token = self.token.read().clone();
        if token.is_empty() {
            return Err(Error::NotAuthenticated);
        }
        let path = format!("bindings?limit={limit}&skip={skip}");
        debug!(limit, skip, "listing bound devices");
        self.log(|l| l.log_request("GET", &format!("/{path}"), None));

        let resp = self
            .http
            .get(self.url(&path))
            .header(CONTENT_TYPE, "application/json")
            .header(APP_ID_HEADER, &self.app_id)
            .header(USER_TOKEN_HEADER, token)
            .send()
            .await?;
        let resp = check_status(resp, "bindings")?;
        let body: BindingsResponse = resp.json().await?;
        Ok(body.devices)
    }

    pub(crate) async fn latest(&self, device: &DeviceId) -> Result<Telemetry> {
        let path = format!("devdata/{device}/latest");
        trace!(device = %device, "reading latest telemetry");
        let token = self.token.read().clone();

        let resp = self
            .http
            .get(self.url(&path))
            .header(CONTENT_TYPE, "application/json")
            .header(APP_ID_HEADER, &self.app_id)
            .header(USER_TOKEN_HEADER, token)
            .send()
            .await?;
        let resp = check_status(resp, "latest telemetry")?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("telemetry body is not JSON: {e}")))?;
        self.log(|l| l.log_read(device.as_str(), status, &body));

        parse_latest(&body).map_err(|e| Error::Protocol(format!("unexpected telemetry shape: {e}")))
    }

    pub(crate) async fn control(
        &self,
        action: &str,
        device: &DeviceId,
        attrs: &ControlAttrs,
    ) -> Result<()> {
        let msg = control_message(attrs);
        debug!(device = %device, action, body = %msg, "sending control command");
        self.log(|l| l.log_command(action, device.as_str(), &msg));
        let token = self.token.read().clone();

        let resp = self
            .http
            .post(self.url(&format!("control/{device}")))
            .header(APP_ID_HEADER, &self.app_id)
            .header(USER_TOKEN_HEADER, token)
            .json(&msg)
            .send()
            .await?;
        check_status(resp, "control")?;
        Ok(())
    }
}

fn check_status(resp: reqwest::Response, context: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(Error::Status {
            status: status.as_u16(),
            context,
        })
    }
}
