use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::client::ApiClient;
use crate::controller::SpaControllerBuilder;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    BINDINGS_MAX_PAGES, BINDINGS_PAGE_SIZE, DEFAULT_APP_ID, DEFAULT_BASE_URL, DEFAULT_LANG,
};
use crate::types::DeviceId;
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SessionBuilder {
    base_url: String,
    app_id: String,
    lang: String,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            lang: DEFAULT_LANG.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn app_id(mut self, id: impl Into<String>) -> Self {
        self.app_id = id.into();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Per-request timeout applied to every API call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Session> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(Session {
            api: ApiClient::new(http, self.base_url, self.app_id, logger),
            lang: self.lang,
            device_ids: Vec::new(),
        })
    }
}

/// Login state shared by every controller built from it.
pub struct Session {
    api: ApiClient,
    lang: String,
    device_ids: Vec<DeviceId>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.has_token()
    }

    /// Device ids found by the last successful [`Session::list_bound_devices`].
    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    /// Log in once. Failures are logged and reported as `false`.
    pub async fn authenticate(&self, username: &str, secret: &str) -> bool {
        match self.api.login(username, secret, &self.lang).await {
            Ok(token) if !token.is_empty() => {
                self.api.set_token(token);
                info!("successfully retrieved api token");
                true
            }
            Ok(_) => {
                error!("login succeeded without a token");
                false
            }
            Err(e) => {
                error!(error = %e, "could not retrieve api token");
                false
            }
        }
    }

    /// [`Session::authenticate`] with up to `attempts` tries, doubling the
    /// delay between them.
    pub async fn authenticate_with_backoff(
        &self,
        username: &str,
        secret: &str,
        attempts: u32,
        initial_delay: Duration,
    ) -> bool {
        let mut delay = initial_delay;
        for attempt in 1..=attempts.max(1) {
            if self.authenticate(username, secret).await {
                return true;
            }
            if attempt < attempts {
                warn!(attempt, ?delay, "login failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }
        false
    }

    /// Page through the account's bindings. On failure the previous list is
    /// kept and an empty result is returned.
    pub async fn list_bound_devices(&mut self) -> Vec<DeviceId> {
        let mut found: Vec<DeviceId> = Vec::new();
        for page in 0..BINDINGS_MAX_PAGES {
            let skip = page * BINDINGS_PAGE_SIZE;
            let devices = match self.api.bindings(BINDINGS_PAGE_SIZE, skip).await {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "could not retrieve devices");
                    return Vec::new();
                }
            };
            let page_len = devices.len();
            for device in devices {
                let id = DeviceId::new(device.did);
                if !found.contains(&id) {
                    found.push(id);
                }
            }
            if page_len < BINDINGS_PAGE_SIZE {
                break;
            }
            debug!(skip, "bindings page full, fetching next");
        }

        info!(count = found.len(), "discovered bound devices");
        self.device_ids = found.clone();
        found
    }

    /// Controller builder for `device_id`, sharing this session's token.
    pub fn controller(&self, device_id: impl Into<DeviceId>) -> Result<SpaControllerBuilder> {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        Ok(SpaControllerBuilder::new(self.api.clone(), device_id.into()))
    }
}
