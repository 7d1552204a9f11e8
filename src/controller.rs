use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::client::ApiClient;
use crate::diff::diff_states;
use crate::protocol::{ControlAttrs, Telemetry};
use crate::types::*;
use crate::workflow::{OnFailure, Workflow, WorkflowOutcome};

pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&DeviceState) + Send + Sync>;

pub struct SpaControllerBuilder {
    api: ApiClient,
    device_id: DeviceId,
    staleness_window: Duration,
    poll_interval: Duration,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl SpaControllerBuilder {
    pub(crate) fn new(api: ApiClient, device_id: DeviceId) -> Self {
        Self {
            api,
            device_id,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
        }
    }

    /// How long a successful read is trusted by `refresh(false)`.
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Period of the background refresh started by
    /// [`SpaController::start_polling`]. Must be non-zero.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&DeviceState) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn build(self) -> SpaController {
        SpaController {
            shared: Arc::new(Shared {
                api: self.api,
                device_id: self.device_id,
                staleness_window: self.staleness_window,
                cache: Mutex::new(Cache::default()),
                commands: tokio::sync::Mutex::new(()),
                event_callbacks: self.event_callbacks,
                snapshot_callbacks: self.snapshot_callbacks,
            }),
            poll_interval: self.poll_interval,
            poller: Mutex::new(None),
        }
    }
}

#[derive(Default)]
struct Cache {
    state: DeviceState,
    fetched_at: Option<Instant>,
    offline: bool,
}

struct Shared {
    api: ApiClient,
    device_id: DeviceId,
    staleness_window: Duration,
    cache: Mutex<Cache>,
    // Held for the whole of every network-touching operation.
    commands: tokio::sync::Mutex<()>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl Shared {
    fn snapshot(&self) -> DeviceState {
        self.cache.lock().state.clone()
    }

    fn emit(&self, event: &Event) {
        for cb in &self.event_callbacks {
            cb(event);
        }
    }

    fn update(&self, f: impl FnOnce(&mut Cache)) -> DeviceState {
        let (previous, current) = {
            let mut cache = self.cache.lock();
            let previous = cache.state.clone();
            f(&mut cache);
            (previous, cache.state.clone())
        };
        for event in diff_states(&self.device_id, &previous, &current) {
            self.emit(&event);
        }
        current
    }

    async fn refresh(&self, force: bool) -> DeviceState {
        let _guard = self.commands.lock().await;
        self.refresh_locked(force).await
    }

    async fn refresh_locked(&self, force: bool) -> DeviceState {
        if !force {
            let cache = self.cache.lock();
            if let Some(at) = cache.fetched_at
                && at.elapsed() < self.staleness_window
            {
                trace!(device = %self.device_id, "cache still fresh, skipping read");
                return cache.state.clone();
            }
        }

        let telemetry = match self.api.latest(&self.device_id).await {
            Ok(t) => t,
            Err(e) => {
                error!(device = %self.device_id, error = %e, "could not retrieve device status");
                return self.snapshot();
            }
        };

        let offline = matches!(telemetry, Telemetry::Offline);
        let mut went_offline = false;
        let state = self.update(|cache| {
            match &telemetry {
                Telemetry::Online(reading) => reading.apply_to(&mut cache.state),
                Telemetry::Offline => {
                    cache.state = DeviceState {
                        last_fetch: cache.state.last_fetch,
                        ..DeviceState::offline()
                    };
                }
            }
            let now = Utc::now();
            cache.state.last_fetch = Some(match cache.state.last_fetch {
                Some(prev) if prev > now => prev,
                _ => now,
            });
            cache.fetched_at = Some(Instant::now());
            went_offline = offline && !cache.offline;
            cache.offline = offline;
        });

        if went_offline {
            info!(device = %self.device_id, "device reports no telemetry, assuming offline");
            self.emit(&Event::DeviceOffline {
                device_id: self.device_id.clone(),
            });
        }
        for cb in &self.snapshot_callbacks {
            cb(&state);
        }
        state
    }

    async fn run_locked(&self, workflow: &Workflow) -> WorkflowOutcome {
        for step in workflow.steps() {
            let confirm_first = matches!(step.on_failure, OnFailure::Abort);
            if !confirm_first {
                self.update(|c| step.attrs.apply_to(&mut c.state));
            }

            let err = match self.api.control(step.action, &self.device_id, &step.attrs).await {
                Ok(()) => {
                    if confirm_first {
                        self.update(|c| step.attrs.apply_to(&mut c.state));
                    }
                    continue;
                }
                Err(e) => e,
            };

            error!(device = %self.device_id, action = step.action, error = %err, "control command failed");
            return match &step.on_failure {
                OnFailure::Keep => WorkflowOutcome::Failed {
                    action: step.action,
                    rolled_back: None,
                    aborted: false,
                },
                OnFailure::Abort => WorkflowOutcome::Failed {
                    action: step.action,
                    rolled_back: None,
                    aborted: true,
                },
                OnFailure::RollBack(rollback) => {
                    debug!(device = %self.device_id, action = step.action, "sending rollback command");
                    let accepted = match self.api.control("rollback", &self.device_id, rollback).await {
                        Ok(()) => true,
                        Err(e) => {
                            error!(device = %self.device_id, error = %e, "rollback command failed");
                            false
                        }
                    };
                    self.update(|c| rollback.apply_to(&mut c.state));
                    WorkflowOutcome::Failed {
                        action: step.action,
                        rolled_back: Some(accepted),
                        aborted: false,
                    }
                }
            };
        }
        WorkflowOutcome::Completed
    }

    /// Build a workflow from the live cache, run it and reconcile with a
    /// forced read, all under the command lock.
    async fn execute(&self, build: impl FnOnce(&DeviceState) -> Workflow) -> DeviceState {
        let _guard = self.commands.lock().await;
        let workflow = build(&self.snapshot());
        let outcome = self.run_locked(&workflow).await;
        match &outcome {
            WorkflowOutcome::Completed => {}
            WorkflowOutcome::Failed {
                action,
                rolled_back: Some(accepted),
                ..
            } => {
                warn!(device = %self.device_id, action, accepted, "heater and filter forced off after rejected command");
            }
            WorkflowOutcome::Failed {
                action,
                aborted: true,
                ..
            } => {
                warn!(device = %self.device_id, action, "safety step rejected, remaining commands not sent");
            }
            WorkflowOutcome::Failed { action, .. } => {
                debug!(device = %self.device_id, action, "write kept locally but unconfirmed");
            }
        }
        if outcome.is_aborted() {
            return self.snapshot();
        }
        self.refresh_locked(true).await
    }
}

/// Cached state and controls of one tub.
///
/// Getters read the cache only. Every setter writes the cache, sends its
/// commands and finishes with a forced refresh; none of them fail, they
/// return the best-known state instead.
pub struct SpaController {
    shared: Arc<Shared>,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SpaController {
    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    pub fn state(&self) -> DeviceState {
        self.shared.snapshot()
    }

    pub fn power(&self) -> bool {
        self.shared.cache.lock().state.power
    }

    pub fn current_temperature(&self) -> Temperature {
        self.shared.cache.lock().state.current_temperature
    }

    pub fn target_temperature(&self) -> TargetTemperature {
        self.shared.cache.lock().state.target_temperature
    }

    pub fn heating_state(&self) -> bool {
        self.shared.cache.lock().state.heating_on
    }

    pub fn wave_state(&self) -> bool {
        self.shared.cache.lock().state.waves_on
    }

    pub fn filter_state(&self) -> bool {
        self.shared.cache.lock().state.filter_on
    }

    pub fn current_heater_state(&self) -> HeaterState {
        HeaterState::from_heating(self.heating_state())
    }

    /// Target heating mode. Heating and filtration are switched together, so
    /// this mirrors the heater flag.
    pub fn target_heater_state(&self) -> HeaterState {
        HeaterState::from_heating(self.heating_state())
    }

    /// Read the latest telemetry unless the cache is younger than the
    /// staleness window (or `force` is set).
    pub async fn refresh(&self, force: bool) -> DeviceState {
        self.shared.refresh(force).await
    }

    /// Switching off is a full shutdown: heater, filter and waves go off with
    /// the power flag.
    pub async fn set_power(&self, on: bool) -> DeviceState {
        let attrs = if on {
            ControlAttrs::power_on()
        } else {
            ControlAttrs::shutdown()
        };
        self.shared
            .execute(|_| Workflow::single("set_power", attrs))
            .await
    }

    /// `celsius` is clamped to the setpoint range.
    pub async fn set_target_temperature(&self, celsius: f64) -> DeviceState {
        let target = TargetTemperature::from_celsius(celsius);
        self.shared
            .execute(|_| Workflow::single("set_target_temperature", ControlAttrs::target(target)))
            .await
    }

    /// Heater and filter are asserted in one command. If the tub rejects it,
    /// both are forced off.
    pub async fn set_heating_and_filter(&self, on: bool) -> DeviceState {
        self.shared
            .execute(|_| {
                Workflow::new().then(
                    "set_heating_and_filter",
                    ControlAttrs::heating_and_filter(on),
                    OnFailure::RollBack(ControlAttrs::heating_and_filter(false)),
                )
            })
            .await
    }

    pub async fn set_wave_state(&self, on: bool) -> DeviceState {
        self.shared
            .execute(|_| Workflow::single("set_wave_state", ControlAttrs::waves(on)))
            .await
    }

    /// The filter is never switched off while the heater may still run: the
    /// heater goes off first, and if that is rejected nothing else is sent.
    pub async fn set_filter_state(&self, on: bool) -> DeviceState {
        let device = self.shared.device_id.clone();
        self.shared
            .execute(|state| {
                let mut workflow = Workflow::new();
                if !on && state.heating_on {
                    debug!(device = %device, "heater is on, switching it off before the filter");
                    workflow = workflow.then("heating_off", ControlAttrs::heating(false), OnFailure::Abort);
                }
                workflow.then("set_filter_state", ControlAttrs::filter(on), OnFailure::Keep)
            })
            .await
    }

    /// Start the background refresh. Replaces a running poller.
    pub fn start_polling(&self) {
        let weak = Arc::downgrade(&self.shared);
        let period = self.poll_interval;
        debug!(device = %self.shared.device_id, ?period, "starting status polling");
        let handle = tokio::spawn(poll_loop(weak, period));
        if let Some(previous) = self.poller.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            debug!(device = %self.shared.device_id, "stopping status polling");
            handle.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SpaController {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}

async fn poll_loop(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.refresh(false).await;
    }
}
