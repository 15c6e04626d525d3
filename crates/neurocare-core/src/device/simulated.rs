//! In-process device used by the CLI and by tests.

use super::{DeviceChannel, DeviceContext, RemoteStateEvent, Subscription, TemperatureEvent};
use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 64;

/// A command the device received, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    SessionStart { intensity: u8 },
    SessionStop,
    Vibration { value: u8 },
}

/// Device simulator backed by broadcast channels.
pub struct SimulatedDevice {
    context: DeviceContext,
    temperature_tx: broadcast::Sender<TemperatureEvent>,
    remote_tx: broadcast::Sender<RemoteStateEvent>,
    commands: Mutex<Vec<DeviceCommand>>,
    reject_commands: AtomicBool,
}

impl SimulatedDevice {
    pub fn new(context: DeviceContext) -> Self {
        let (temperature_tx, _) = broadcast::channel(FEED_CAPACITY);
        let (remote_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            context,
            temperature_tx,
            remote_tx,
            commands: Mutex::new(Vec::new()),
            reject_commands: AtomicBool::new(false),
        }
    }

    /// A connected device with default battery level.
    pub fn connected() -> Self {
        Self::new(DeviceContext::new(true, 75))
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Make every outbound command fail (for exercising error paths).
    pub fn set_reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    /// Commands received so far.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Publish a temperature reading to all subscribers.
    pub fn push_temperature(&self, celsius: f64) {
        let _ = self.temperature_tx.send(TemperatureEvent::Reading(celsius));
    }

    /// Publish a feed error to all subscribers.
    pub fn push_feed_error(&self, message: impl Into<String>) {
        let _ = self
            .temperature_tx
            .send(TemperatureEvent::Error(message.into()));
    }

    /// Simulate another controller changing the intensity.
    pub fn push_remote_intensity(&self, value: u8) {
        let _ = self.remote_tx.send(RemoteStateEvent::Intensity(value));
    }

    /// Start a sensor task emitting a random-walk temperature around
    /// `baseline` every `period`. Must be called within a Tokio runtime.
    pub fn spawn_sensor(self: &Arc<Self>, baseline: f64, period: Duration) -> Subscription {
        let device = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut current = baseline;
            loop {
                ticker.tick().await;
                let delta: f64 = rand::thread_rng().gen_range(-0.15..=0.15);
                // pull back toward baseline so the walk stays plausible
                current += delta + (baseline - current) * 0.1;
                device.push_temperature((current * 10.0).round() / 10.0);
            }
        });
        Subscription::new(handle.abort_handle())
    }

    fn record(&self, command: DeviceCommand) -> Result<()> {
        if self.reject_commands.load(Ordering::SeqCst) {
            return Err(Error::Other(format!("device rejected {:?}", command)));
        }
        if !self.context.is_connected() {
            return Err(Error::device_not_connected("send device commands"));
        }
        debug!(?command, "device command");
        self.commands
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .push(command);
        Ok(())
    }
}

#[async_trait]
impl DeviceChannel for SimulatedDevice {
    async fn set_session_active(&self, active: bool, intensity: u8) -> Result<()> {
        if active {
            self.record(DeviceCommand::SessionStart { intensity })
        } else {
            self.record(DeviceCommand::SessionStop)
        }
    }

    async fn set_intensity(&self, value: u8) -> Result<()> {
        self.record(DeviceCommand::Vibration { value })
    }

    fn subscribe_temperature(&self) -> broadcast::Receiver<TemperatureEvent> {
        self.temperature_tx.subscribe()
    }

    fn subscribe_remote_state(&self) -> Option<broadcast::Receiver<RemoteStateEvent>> {
        Some(self.remote_tx.subscribe())
    }

    fn is_connected(&self) -> bool {
        self.context.is_connected()
    }
}
