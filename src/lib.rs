mod client;
mod controller;
mod diff;
mod error;
mod logger;
mod protocol;
mod session;
mod types;
mod workflow;

pub use client::ApiClient;
pub use controller::{
    SpaController, SpaControllerBuilder, DEFAULT_POLL_INTERVAL, DEFAULT_STALENESS_WINDOW,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{DEFAULT_APP_ID, DEFAULT_BASE_URL};
pub use session::{Session, SessionBuilder, DEFAULT_REQUEST_TIMEOUT};
pub use types::*;
