//! Real-time link to the therapy device.
//!
//! The controller talks to the device through [`DeviceChannel`]: outbound
//! commands are fire-and-forget, inbound temperature readings arrive on a
//! broadcast feed. A [`Subscription`] owns the task consuming a feed and
//! releases it when dropped.

mod simulated;

pub use simulated::*;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

/// One item on the temperature feed.
#[derive(Debug, Clone, PartialEq)]
pub enum TemperatureEvent {
    /// A reading in °C.
    Reading(f64),
    /// A transient feed failure. The subscription stays open.
    Error(String),
}

/// State pushed by the device (or another controller of it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStateEvent {
    Intensity(u8),
}

/// Abstract link to the physical device.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Announce that a session started or ended at the given intensity.
    async fn set_session_active(&self, active: bool, intensity: u8) -> Result<()>;

    /// Change the vibration intensity.
    async fn set_intensity(&self, value: u8) -> Result<()>;

    /// Open a new temperature feed. Each call starts an independent receiver.
    fn subscribe_temperature(&self) -> broadcast::Receiver<TemperatureEvent>;

    /// Open a feed of remote state changes, if the device pushes any.
    fn subscribe_remote_state(&self) -> Option<broadcast::Receiver<RemoteStateEvent>> {
        None
    }

    /// Whether the device is currently reachable.
    fn is_connected(&self) -> bool;
}

/// Handle to a running feed consumer. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    abort_handle: AbortHandle,
}

impl Subscription {
    pub fn new(abort_handle: AbortHandle) -> Self {
        Self { abort_handle }
    }

    /// Stop consuming the feed.
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    pub fn is_active(&self) -> bool {
        !self.abort_handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// App-wide device status, passed explicitly to whoever needs it.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    inner: Arc<DeviceStatus>,
}

#[derive(Debug)]
struct DeviceStatus {
    connected: AtomicBool,
    battery: AtomicU8,
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new(false, 75)
    }
}

impl DeviceContext {
    pub fn new(connected: bool, battery: u8) -> Self {
        Self {
            inner: Arc::new(DeviceStatus {
                connected: AtomicBool::new(connected),
                battery: AtomicU8::new(battery.min(100)),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Battery level in percent.
    pub fn battery(&self) -> u8 {
        self.inner.battery.load(Ordering::SeqCst)
    }

    pub fn set_battery(&self, level: u8) {
        self.inner.battery.store(level.min(100), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_context_shared() {
        let ctx = DeviceContext::default();
        assert!(!ctx.is_connected());
        assert_eq!(ctx.battery(), 75);

        let other = ctx.clone();
        other.set_connected(true);
        other.set_battery(140);
        assert!(ctx.is_connected());
        assert_eq!(ctx.battery(), 100);
    }

    #[tokio::test]
    async fn test_subscription_drop_aborts_task() {
        let handle = tokio::spawn(async {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        });
        let sub = Subscription::new(handle.abort_handle());
        assert!(sub.is_active());
        sub.unsubscribe();

        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
