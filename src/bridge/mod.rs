//! Sensor bridge: keeps one accessory's characteristics fresh.
//!
//! Attaching a bridge to an accessory ensures its services exist (reusing
//! restored ones) and starts a polling task. Every [`POLL_INTERVAL`] the task
//! fetches a [`Reading`] from the bridge's [`ReadingSource`] and writes it
//! into the matching characteristics.
//!
//! At most one request is outstanding per bridge: a tick that fires while
//! the previous request is still in flight is skipped, not queued. A failed
//! poll is logged and leaves every characteristic at its last value.
//!
//! The polling task lives until [`SensorBridge::shutdown`] is called or the
//! bridge is dropped.

pub mod device_info;
pub mod reading;
pub mod source;

pub use device_info::{ACCESSORY_INFO, AccessoryInfo};
pub use reading::{Reading, ReadingKind};
pub use source::{HttpReadingSource, ReadingSource, SENSORS_PATH};

use crate::accessory::{AccessoryHandle, CharacteristicKind, Service, ServiceKind};
use crate::error::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Fixed polling period. The first poll fires at attach time.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Counters for one bridge's polling loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollStats {
    /// Timer ticks, including skipped ones
    pub ticks: u64,
    /// Requests actually issued
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Ticks dropped because a request was still in flight
    pub skipped: u64,
    /// Failures since the last success
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// State shared between the bridge handle and its polling task.
struct BridgeState {
    name: String,
    services: Vec<(ReadingKind, Arc<Service>)>,
    source: Arc<dyn ReadingSource>,
    in_flight: AtomicBool,
    stats: Mutex<PollStats>,
}

impl BridgeState {
    /// One poll cycle: fetch, validate, write. Errors end the cycle only.
    async fn poll_once(&self) -> Result<()> {
        self.stats.lock().requests += 1;
        debug!("[Bridge] {}: reading sensors from {}", self.name, self.source.describe());

        let result = match self.source.fetch().await {
            Ok(reading) => reading.validate().map(|()| reading),
            Err(e) => Err(e),
        };

        match result {
            Ok(reading) => {
                self.apply(&reading);
                let mut stats = self.stats.lock();
                stats.successes += 1;
                stats.consecutive_failures = 0;
                stats.last_success = Some(Utc::now());
                debug!(
                    "[Bridge] {}: {:.1}°C {:.1}% {:.0} lx",
                    self.name, reading.temperature, reading.humidity, reading.brightness
                );
                Ok(())
            }
            Err(e) => {
                error!("[Bridge] {}: poll failed: {}", self.name, e);
                let mut stats = self.stats.lock();
                stats.failures += 1;
                stats.consecutive_failures += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn apply(&self, reading: &Reading) {
        for (kind, service) in &self.services {
            service.set_characteristic(kind.characteristic(), reading.value(*kind));
        }
    }
}

/// Polling bridge for one accessory.
pub struct SensorBridge {
    accessory: AccessoryHandle,
    state: Arc<BridgeState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SensorBridge {
    /// Set up the accessory's services and start polling with the default
    /// interval. Must be called within a Tokio runtime.
    pub fn attach(
        accessory: AccessoryHandle,
        kinds: &[ReadingKind],
        source: Arc<dyn ReadingSource>,
    ) -> Result<Self> {
        Self::attach_with_interval(accessory, kinds, source, POLL_INTERVAL)
    }

    pub fn attach_with_interval(
        accessory: AccessoryHandle,
        kinds: &[ReadingKind],
        source: Arc<dyn ReadingSource>,
        interval: Duration,
    ) -> Result<Self> {
        let services = Self::setup(&accessory, kinds)?;
        let state = Arc::new(BridgeState {
            name: accessory.display_name().to_string(),
            services,
            source,
            in_flight: AtomicBool::new(false),
            stats: Mutex::new(PollStats::default()),
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poll_loop(state.clone(), interval, cancel.clone()));

        info!(
            "[Bridge] {}: polling {} every {:?}",
            state.name,
            state.source.describe(),
            interval
        );

        Ok(Self {
            accessory,
            state,
            cancel,
            task,
        })
    }

    /// Ensure the accessory exposes the information service and one service
    /// per reading kind, named after the device. Safe to call repeatedly:
    /// existing services are reused, never duplicated.
    pub fn setup(
        accessory: &AccessoryHandle,
        kinds: &[ReadingKind],
    ) -> Result<Vec<(ReadingKind, Arc<Service>)>> {
        let context = accessory.device_context()?;

        accessory
            .ensure_service(ServiceKind::AccessoryInformation)
            .set_characteristic(CharacteristicKind::Manufacturer, ACCESSORY_INFO.manufacturer)
            .set_characteristic(CharacteristicKind::Model, ACCESSORY_INFO.model)
            .set_characteristic(CharacteristicKind::SerialNumber, ACCESSORY_INFO.serial_number);

        let services = kinds
            .iter()
            .map(|kind| {
                let service = accessory.ensure_service(kind.service_kind());
                service.set_characteristic(
                    CharacteristicKind::Name,
                    context.device.display_name.as_str(),
                );
                (*kind, service)
            })
            .collect();

        Ok(services)
    }

    pub fn accessory(&self) -> &AccessoryHandle {
        &self.accessory
    }

    /// Snapshot of the polling counters.
    pub fn stats(&self) -> PollStats {
        self.state.stats.lock().clone()
    }

    /// Reading kinds this bridge writes.
    pub fn kinds(&self) -> Vec<ReadingKind> {
        self.state.services.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the polling task and any in-flight request, then wait for the
    /// task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        // Cancelled tasks exit cleanly; a JoinError here means a panic, which
        // is already reported by the runtime.
        let _ = (&mut self.task).await;
        info!("[Bridge] {}: stopped", self.state.name);
    }
}

impl Drop for SensorBridge {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop(state: Arc<BridgeState>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        state.stats.lock().ticks += 1;

        if state.in_flight.swap(true, Ordering::SeqCst) {
            state.stats.lock().skipped += 1;
            debug!("[Bridge] {}: previous poll still in flight, skipping tick", state.name);
            continue;
        }

        // The request runs on its own task so the timer keeps its period.
        let state = state.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = state.poll_once() => {}
            }
            state.in_flight.store(false, Ordering::SeqCst);
        });
    }

    debug!("[Bridge] {}: polling stopped", state.name);
}
