//! Live therapy session state machine.
//!
//! ```text
//!          start()                stop() / emergency_stop()
//!   Idle ───────────► Active ─────────────────────────────► Stopping ──save──► Idle
//!    ▲                  │ adjust_intensity()                                    │
//!    │                  └──────────┘                                            │
//!    └───────────────────────────── acknowledge() resets elapsed ◄──────────────┘
//! ```
//!
//! All mutable state lives behind one mutex that is never held across an
//! `.await`. The tick task and the feed consumers are owned as
//! [`Subscription`]s, so dropping the controller releases them.

use crate::auth::AuthContext;
use crate::config::SessionConfig;
use crate::device::{DeviceChannel, RemoteStateEvent, Subscription, TemperatureEvent};
use crate::error::{Error, Result};
use crate::repository::SessionRepository;
use crate::types::{validate_intensity, NewSessionRecord, SessionRecord, SessionTimestamp};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::temperature::TemperatureBuffer;

/// Where the controller is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    /// Transient, only while the finished session is being persisted.
    Stopping,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// How a session was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Normal,
    Emergency,
}

impl StopReason {
    fn operation(&self) -> &'static str {
        match self {
            Self::Normal => "stop the session",
            Self::Emergency => "emergency-stop the session",
        }
    }
}

/// A session that ended and was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub record: SessionRecord,
    pub reason: StopReason,
}

/// Point-in-time view of the live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_active: bool,
    pub elapsed_seconds: u64,
    pub vibration_intensity: u8,
    pub last_temperature: f64,
    /// Oldest first.
    pub recent_temperatures: Vec<f64>,
    pub has_unsaved_record: bool,
}

#[derive(Debug, Clone)]
struct UnsavedSession {
    record: NewSessionRecord,
    reason: StopReason,
}

#[derive(Debug)]
struct LiveSession {
    phase: SessionPhase,
    elapsed_seconds: u64,
    vibration_intensity: u8,
    last_temperature: f64,
    samples: TemperatureBuffer,
    /// Bumped on every start so a stale tick task can never count.
    generation: u64,
    ticker: Option<Subscription>,
    unsaved: Option<UnsavedSession>,
}

impl LiveSession {
    fn new(config: &SessionConfig) -> Self {
        Self {
            phase: SessionPhase::Idle,
            elapsed_seconds: 0,
            vibration_intensity: config.default_intensity,
            last_temperature: config.initial_temperature,
            samples: TemperatureBuffer::new(config.temperature_buffer_capacity),
            generation: 0,
            ticker: None,
            unsaved: None,
        }
    }

    /// Finish a stop or retry. Anything else that moved the phase on in
    /// the meantime (a shutdown) is left alone.
    fn leave_stopping(&mut self) {
        if self.phase == SessionPhase::Stopping {
            self.phase = SessionPhase::Idle;
        }
    }

    fn tick(&mut self, generation: u64) -> bool {
        if self.phase != SessionPhase::Active || self.generation != generation {
            return false;
        }
        self.elapsed_seconds += 1;
        true
    }

    fn record_temperature(&mut self, celsius: f64) {
        self.last_temperature = celsius;
        self.samples.push(celsius);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            is_active: self.phase == SessionPhase::Active,
            elapsed_seconds: self.elapsed_seconds,
            vibration_intensity: self.vibration_intensity,
            last_temperature: self.last_temperature,
            recent_temperatures: self.samples.to_vec(),
            has_unsaved_record: self.unsaved.is_some(),
        }
    }
}

/// Controls one live therapy session at a time.
pub struct SessionController {
    auth: AuthContext,
    device: Arc<dyn DeviceChannel>,
    repository: Arc<dyn SessionRepository>,
    config: SessionConfig,
    state: Arc<Mutex<LiveSession>>,
    feeds: Mutex<Vec<Subscription>>,
}

impl SessionController {
    /// Create a controller and subscribe to the device feeds.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        auth: AuthContext,
        device: Arc<dyn DeviceChannel>,
        repository: Arc<dyn SessionRepository>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Other("session controller requires a Tokio runtime".into()))?;

        let state = Arc::new(Mutex::new(LiveSession::new(&config)));

        let mut feeds = vec![spawn_temperature_feed(
            Arc::clone(&state),
            device.subscribe_temperature(),
        )];
        if let Some(remote) = device.subscribe_remote_state() {
            feeds.push(spawn_remote_state_feed(Arc::clone(&state), remote));
        }

        Ok(Self {
            auth,
            device,
            repository,
            config,
            state,
            feeds: Mutex::new(feeds),
        })
    }

    /// Create with default configuration.
    pub fn with_defaults(
        auth: AuthContext,
        device: Arc<dyn DeviceChannel>,
        repository: Arc<dyn SessionRepository>,
    ) -> Result<Self> {
        Self::new(auth, device, repository, SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, LiveSession>> {
        self.state.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Current view of the session.
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        Ok(self.lock_state()?.snapshot())
    }

    pub fn phase(&self) -> Result<SessionPhase> {
        Ok(self.lock_state()?.phase)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase(), Ok(SessionPhase::Active))
    }

    pub fn elapsed_seconds(&self) -> Result<u64> {
        Ok(self.lock_state()?.elapsed_seconds)
    }

    /// Begin a session.
    ///
    /// Rejected with `DeviceNotConnected` when the device is unreachable,
    /// and with `UnsavedSessionPending` while a finished session still
    /// waits for [`retry_save`](Self::retry_save) or
    /// [`discard_unsaved`](Self::discard_unsaved).
    /// The device is told about the session afterwards; a failed
    /// notification is logged and does not undo the start.
    pub async fn start(&self) -> Result<()> {
        let intensity = {
            let mut state = self.lock_state()?;
            if state.phase != SessionPhase::Idle {
                return Err(Error::invalid_transition("start a session", state.phase));
            }
            if state.unsaved.is_some() {
                return Err(Error::unsaved_session_pending("start a session"));
            }
            if !self.device.is_connected() {
                return Err(Error::device_not_connected("start a session"));
            }

            state.phase = SessionPhase::Active;
            state.elapsed_seconds = 0;
            state.generation += 1;
            state.ticker = Some(spawn_ticker(
                Arc::clone(&self.state),
                state.generation,
                self.config.tick_interval(),
            ));
            state.vibration_intensity
        };

        info!(intensity, "therapy session started");

        if let Err(e) = self.device.set_session_active(true, intensity).await {
            warn!(error = %e, "failed to notify device of session start");
        }
        Ok(())
    }

    /// Change the vibration intensity and forward it to the device.
    pub async fn adjust_intensity(&self, value: i64) -> Result<()> {
        let value = validate_intensity(value)?;
        {
            let mut state = self.lock_state()?;
            if self.config.intensity_requires_active && state.phase != SessionPhase::Active {
                return Err(Error::invalid_transition("adjust intensity", state.phase));
            }
            state.vibration_intensity = value;
        }

        debug!(intensity = value, "vibration intensity adjusted");

        if let Err(e) = self.device.set_intensity(value).await {
            warn!(error = %e, intensity = value, "failed to send intensity to device");
        }
        Ok(())
    }

    /// Apply an intensity pushed from elsewhere. The latest write wins.
    pub fn apply_remote_intensity(&self, value: u8) -> Result<()> {
        apply_remote_intensity(&self.state, value)
    }

    /// End the session and persist it.
    pub async fn stop(&self) -> Result<CompletedSession> {
        self.finish(StopReason::Normal).await
    }

    /// End the session immediately. Same effect as [`stop`](Self::stop);
    /// confirmation is up to the caller.
    pub async fn emergency_stop(&self) -> Result<CompletedSession> {
        warn!("emergency stop requested");
        self.finish(StopReason::Emergency).await
    }

    async fn finish(&self, reason: StopReason) -> Result<CompletedSession> {
        let user_id = self.auth.user_id();
        let record = {
            let mut state = self.lock_state()?;
            if state.phase != SessionPhase::Active {
                return Err(Error::invalid_transition(reason.operation(), state.phase));
            }

            // cancel the tick before reading the final duration
            state.ticker = None;
            state.phase = SessionPhase::Stopping;

            NewSessionRecord {
                user_id: user_id.clone().unwrap_or_default(),
                timestamp: SessionTimestamp::now(),
                duration: state.elapsed_seconds,
                vibration_intensity: state.vibration_intensity,
                average_temperature: Some(state.last_temperature),
                average_heart_rate: None,
            }
        };

        info!(
            duration = record.duration,
            intensity = record.vibration_intensity,
            ?reason,
            "therapy session stopped"
        );

        if let Err(e) = self
            .device
            .set_session_active(false, record.vibration_intensity)
            .await
        {
            warn!(error = %e, "failed to notify device of session end");
        }

        if user_id.is_none() {
            self.park_unsaved(record, reason)?;
            let err = Error::missing_auth("saving the session");
            error!(error = %err, "session not saved");
            return Err(err);
        }

        self.persist(record, reason).await
    }

    async fn persist(&self, record: NewSessionRecord, reason: StopReason) -> Result<CompletedSession> {
        match self.repository.save(record.clone()).await {
            Ok(id) => {
                self.lock_state()?.leave_stopping();
                info!(session_id = %id, "session saved");
                Ok(CompletedSession {
                    record: record.into_record(id),
                    reason,
                })
            }
            Err(e) => {
                self.park_unsaved(record, reason)?;
                let err = match e {
                    Error::Persistence { .. } => e,
                    other => Error::persistence("save the session", other),
                };
                error!(error = %err, "failed to save session");
                Err(err)
            }
        }
    }

    fn park_unsaved(&self, record: NewSessionRecord, reason: StopReason) -> Result<()> {
        let mut state = self.lock_state()?;
        state.leave_stopping();
        if let Some(previous) = state.unsaved.replace(UnsavedSession { record, reason }) {
            warn!(
                duration = previous.record.duration,
                "earlier unsaved session replaced"
            );
        }
        Ok(())
    }

    /// Reset the elapsed counter once the caller has seen the result.
    pub fn acknowledge(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        if state.phase != SessionPhase::Idle {
            return Err(Error::invalid_transition("acknowledge the session", state.phase));
        }
        state.elapsed_seconds = 0;
        Ok(())
    }

    /// The finished session that could not be saved, if any.
    pub fn unsaved_record(&self) -> Result<Option<NewSessionRecord>> {
        Ok(self.lock_state()?.unsaved.as_ref().map(|u| u.record.clone()))
    }

    /// Try once more to save the session whose save failed.
    ///
    /// The controller is `Stopping` until the save resolves, so no new
    /// session can start in the meantime.
    pub async fn retry_save(&self) -> Result<CompletedSession> {
        let (record, reason) = {
            let mut state = self.lock_state()?;
            if state.phase != SessionPhase::Idle {
                return Err(Error::invalid_transition("retry saving the session", state.phase));
            }
            let Some(mut unsaved) = state.unsaved.take() else {
                return Err(Error::Other("no unsaved session to retry".into()));
            };
            if unsaved.record.user_id.is_empty() {
                match self.auth.require_user("saving the session") {
                    Ok(user_id) => unsaved.record.user_id = user_id,
                    Err(e) => {
                        state.unsaved = Some(unsaved);
                        return Err(e);
                    }
                }
            }

            state.phase = SessionPhase::Stopping;
            (unsaved.record, unsaved.reason)
        };

        info!("retrying session save");
        self.persist(record, reason).await
    }

    /// Drop the unsaved session, returning it.
    pub fn discard_unsaved(&self) -> Result<Option<NewSessionRecord>> {
        let discarded = self.lock_state()?.unsaved.take().map(|u| u.record);
        if discarded.is_some() {
            info!("unsaved session discarded");
        }
        Ok(discarded)
    }

    /// Release the timer and all feed subscriptions.
    ///
    /// A session still running is abandoned without being saved.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if state.phase == SessionPhase::Active {
                warn!(
                    elapsed = state.elapsed_seconds,
                    "controller shut down during an active session"
                );
            }
            state.ticker = None;
            state.phase = SessionPhase::Idle;
        }
        self.feeds.lock().map_err(|_| Error::LockPoisoned)?.clear();
        debug!("session controller shut down");
        Ok(())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // the tick task holds the state, so it has to be released explicitly
        if let Ok(mut state) = self.state.lock() {
            state.ticker = None;
        }
    }
}

fn apply_remote_intensity(state: &Mutex<LiveSession>, value: u8) -> Result<()> {
    let value = validate_intensity(i64::from(value))?;
    let mut state = state.lock().map_err(|_| Error::LockPoisoned)?;
    if state.vibration_intensity != value {
        debug!(
            from = state.vibration_intensity,
            to = value,
            "remote intensity applied"
        );
    }
    state.vibration_intensity = value;
    Ok(())
}

fn spawn_ticker(
    state: Arc<Mutex<LiveSession>>,
    generation: u64,
    period: std::time::Duration,
) -> Subscription {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let counted = match state.lock() {
                Ok(mut state) => state.tick(generation),
                Err(_) => false,
            };
            if !counted {
                break;
            }
        }
    });
    Subscription::new(handle.abort_handle())
}

fn spawn_temperature_feed(
    state: Arc<Mutex<LiveSession>>,
    mut feed: broadcast::Receiver<TemperatureEvent>,
) -> Subscription {
    let handle = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(TemperatureEvent::Reading(celsius)) if celsius.is_finite() => {
                    if let Ok(mut state) = state.lock() {
                        state.record_temperature(celsius);
                    }
                }
                Ok(TemperatureEvent::Reading(celsius)) => {
                    warn!(reading = celsius, "ignoring non-finite temperature reading");
                }
                Ok(TemperatureEvent::Error(message)) => {
                    warn!(error = %message, "temperature feed error, staying subscribed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "temperature feed lagged, readings dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("temperature feed closed");
                    break;
                }
            }
        }
    });
    Subscription::new(handle.abort_handle())
}

fn spawn_remote_state_feed(
    state: Arc<Mutex<LiveSession>>,
    mut feed: broadcast::Receiver<RemoteStateEvent>,
) -> Subscription {
    let handle = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(RemoteStateEvent::Intensity(value)) => {
                    if let Err(e) = apply_remote_intensity(&state, value) {
                        warn!(error = %e, "rejected remote intensity");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "remote state feed lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    Subscription::new(handle.abort_handle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCommand, SimulatedDevice};
    use crate::repository::InMemorySessionRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    /// Repository whose saves take a while to resolve.
    struct SlowRepository {
        inner: InMemorySessionRepository,
        delay: Duration,
    }

    #[async_trait]
    impl SessionRepository for SlowRepository {
        async fn save(&self, record: NewSessionRecord) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(record).await
        }

        async fn list_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
            self.inner.list_by_user(user_id).await
        }

        async fn delete_one(&self, user_id: &str, id: &str) -> Result<()> {
            self.inner.delete_one(user_id, id).await
        }

        async fn delete_all_for_user(&self, user_id: &str) -> Result<usize> {
            self.inner.delete_all_for_user(user_id).await
        }
    }

    /// Device that takes two seconds to answer a session start, then fails.
    struct LaggingDevice {
        temperature_tx: broadcast::Sender<TemperatureEvent>,
        start_answered: AtomicBool,
    }

    impl LaggingDevice {
        fn new() -> Self {
            let (temperature_tx, _) = broadcast::channel(8);
            Self {
                temperature_tx,
                start_answered: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DeviceChannel for LaggingDevice {
        async fn set_session_active(&self, active: bool, _intensity: u8) -> Result<()> {
            if !active {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.start_answered.store(true, Ordering::SeqCst);
            Err(Error::Other("link timeout".into()))
        }

        async fn set_intensity(&self, _value: u8) -> Result<()> {
            Ok(())
        }

        fn subscribe_temperature(&self) -> broadcast::Receiver<TemperatureEvent> {
            self.temperature_tx.subscribe()
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct Harness {
        device: Arc<SimulatedDevice>,
        repo: Arc<InMemorySessionRepository>,
        auth: AuthContext,
        controller: SessionController,
    }

    fn harness_with(config: SessionConfig) -> Harness {
        let device = Arc::new(SimulatedDevice::connected());
        let repo = Arc::new(InMemorySessionRepository::new());
        let auth = AuthContext::signed_in("user-1");
        let controller = SessionController::new(
            auth.clone(),
            device.clone(),
            repo.clone(),
            config,
        )
        .unwrap();
        Harness {
            device,
            repo,
            auth,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(SessionConfig::default())
    }

    /// Let spawned tasks drain their queues (clock is paused in these tests).
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_connected_device() {
        let h = harness();
        h.device.context().set_connected(false);

        let err = h.controller.start().await.unwrap_err();
        assert!(err.is_device_not_connected());
        assert!(!h.controller.is_active());
        assert_eq!(h.controller.phase().unwrap(), SessionPhase::Idle);
        assert!(h.device.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_notifies_device() {
        let h = harness();
        assert_ok!(h.controller.start().await);

        assert!(h.controller.is_active());
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 0);
        assert_eq!(
            h.device.commands(),
            vec![DeviceCommand::SessionStart { intensity: 50 }]
        );

        let err = h.controller.start().await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_frozen_after_stop() {
        let h = harness();
        h.controller.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 5);

        let completed = h.controller.stop().await.unwrap();
        assert_eq!(completed.record.duration, 5);
        assert_eq!(completed.reason, StopReason::Normal);
        assert_eq!(completed.record.user_id, "user-1");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 5);

        let saved = h.repo.list_by_user("user-1").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].duration, 5);
        assert_eq!(saved[0].id, completed.record.id);

        h.controller.acknowledge().unwrap();
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_elapsed() {
        let h = harness();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        h.controller.stop().await.unwrap();

        h.controller.start().await.unwrap();
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(h.controller.elapsed_seconds().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjust_intensity_validation() {
        let h = harness();
        h.controller.start().await.unwrap();

        let err = h.controller.adjust_intensity(150).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 50);

        let err = h.controller.adjust_intensity(-5).await.unwrap_err();
        assert!(err.is_validation());

        assert_ok!(h.controller.adjust_intensity(80).await);
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 80);
        assert_eq!(
            h.device.commands().last(),
            Some(&DeviceCommand::Vibration { value: 80 })
        );

        let completed = h.controller.stop().await.unwrap();
        assert_eq!(completed.record.vibration_intensity, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intensity_requires_active_when_configured() {
        let h = harness_with(SessionConfig::default().with_intensity_requires_active(true));
        let err = h.controller.adjust_intensity(30).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        let h = harness();
        assert_ok!(h.controller.adjust_intensity(30).await);
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_temperature_buffer_bounded() {
        let h = harness();
        for i in 0..31 {
            h.device.push_temperature(36.0 + i as f64 * 0.1);
        }
        settle().await;

        let snapshot = h.controller.snapshot().unwrap();
        assert_eq!(snapshot.recent_temperatures.len(), 30);
        assert!((snapshot.recent_temperatures[0] - 36.1).abs() < 1e-9);
        assert!((snapshot.last_temperature - 39.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_uses_last_temperature() {
        let h = harness();
        assert_eq!(h.controller.snapshot().unwrap().last_temperature, 37.0);

        h.controller.start().await.unwrap();
        h.device.push_temperature(36.4);
        h.device.push_temperature(38.2);
        settle().await;

        let completed = h.controller.stop().await.unwrap();
        assert_eq!(completed.record.average_temperature, Some(38.2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_error_keeps_subscription() {
        let h = harness();
        h.device.push_feed_error("connection reset");
        h.device.push_temperature(f64::NAN);
        h.device.push_temperature(36.1);
        settle().await;

        let snapshot = h.controller.snapshot().unwrap();
        assert_eq!(snapshot.last_temperature, 36.1);
        assert_eq!(snapshot.recent_temperatures, vec![36.1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_stops_and_keeps_record() {
        let h = harness();
        h.repo.set_fail_writes(true);
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_200)).await;

        let err = h.controller.stop().await.unwrap_err();
        assert!(err.is_persistence());
        assert!(!h.controller.is_active());
        assert_eq!(h.controller.phase().unwrap(), SessionPhase::Idle);
        assert!(h.repo.is_empty().await);
        assert!(h.controller.snapshot().unwrap().has_unsaved_record);
        assert_eq!(h.controller.unsaved_record().unwrap().unwrap().duration, 3);

        // no automatic retry happened
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.repo.is_empty().await);

        h.repo.set_fail_writes(false);
        let completed = h.controller.retry_save().await.unwrap();
        assert_eq!(completed.record.duration, 3);
        assert_eq!(h.repo.len().await, 1);
        assert!(h.controller.unsaved_record().unwrap().is_none());

        assert!(h.controller.retry_save().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_unsaved() {
        let h = harness();
        h.repo.set_fail_writes(true);
        h.controller.start().await.unwrap();
        assert!(h.controller.stop().await.is_err());

        let discarded = h.controller.discard_unsaved().unwrap();
        assert!(discarded.is_some());
        assert!(h.controller.unsaved_record().unwrap().is_none());
        assert!(h.controller.discard_unsaved().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_auth_keeps_record_for_retry() {
        let h = harness();
        h.auth.sign_out();
        h.controller.start().await.unwrap();

        let err = h.controller.stop().await.unwrap_err();
        assert!(matches!(err, Error::MissingAuth { .. }));
        assert!(!h.controller.is_active());

        h.auth.sign_in("user-2");
        let completed = h.controller.retry_save().await.unwrap();
        assert_eq!(completed.record.user_id, "user-2");
        assert_eq!(h.repo.list_by_user("user-2").await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_stop() {
        let h = harness();
        let err = h.controller.emergency_stop().await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let completed = h.controller.emergency_stop().await.unwrap();
        assert_eq!(completed.reason, StopReason::Emergency);
        assert_eq!(completed.record.duration, 1);
        assert_eq!(h.device.commands().last(), Some(&DeviceCommand::SessionStop));

        let err = h.controller.stop().await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_notification_failure_is_not_fatal() {
        let h = harness();
        h.device.set_reject_commands(true);

        assert_ok!(h.controller.start().await);
        assert!(h.controller.is_active());
        assert_ok!(h.controller.adjust_intensity(20).await);
        assert_ok!(h.controller.stop().await);
        assert!(h.device.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_intensity_last_write_wins() {
        let h = harness();
        h.device.push_remote_intensity(70);
        settle().await;
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 70);

        h.controller.adjust_intensity(20).await.unwrap();
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 20);

        h.device.push_remote_intensity(200);
        settle().await;
        assert_eq!(h.controller.snapshot().unwrap().vibration_intensity, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let h = harness();
        h.controller.start().await.unwrap();
        let state = Arc::clone(&h.controller.state);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        drop(h.controller);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = state.lock().unwrap();
        assert_eq!(state.elapsed_seconds, 1);
        assert!(state.ticker.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_timer_and_feeds() {
        let h = harness();
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        h.controller.shutdown().unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let snapshot = h.controller.snapshot().unwrap();
        assert_eq!(snapshot.elapsed_seconds, 1);
        assert!(!snapshot.is_active);

        h.device.push_temperature(40.0);
        settle().await;
        assert_eq!(h.controller.snapshot().unwrap().last_temperature, 37.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_in_flight_blocks_start() {
        let repo = Arc::new(SlowRepository {
            inner: InMemorySessionRepository::new(),
            delay: Duration::from_secs(2),
        });
        let controller = SessionController::with_defaults(
            AuthContext::signed_in("user-1"),
            Arc::new(SimulatedDevice::connected()),
            repo.clone(),
        )
        .unwrap();

        repo.inner.set_fail_writes(true);
        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(controller.stop().await.unwrap_err().is_persistence());
        repo.inner.set_fail_writes(false);

        let (retried, (phase_during, restarted)) = tokio::join!(controller.retry_save(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let phase = controller.phase().unwrap();
            (phase, controller.start().await)
        });

        assert_eq!(retried.unwrap().record.duration, 1);
        assert_eq!(phase_during, SessionPhase::Stopping);
        assert!(matches!(
            restarted.unwrap_err(),
            Error::InvalidStateTransition { .. }
        ));
        assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
        assert_eq!(repo.inner.len().await, 1);

        // the next session runs undisturbed
        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(controller.is_active());
        assert_eq!(controller.elapsed_seconds().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_blocked_by_unsaved_session() {
        let h = harness();
        h.repo.set_fail_writes(true);
        h.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(7_500)).await;
        assert!(h.controller.stop().await.is_err());

        let err = h.controller.start().await.unwrap_err();
        assert!(matches!(err, Error::UnsavedSessionPending { .. }));
        assert!(!h.controller.is_active());
        assert_eq!(h.controller.unsaved_record().unwrap().unwrap().duration, 7);
        assert_eq!(
            h.device.commands(),
            vec![
                DeviceCommand::SessionStart { intensity: 50 },
                DeviceCommand::SessionStop
            ]
        );

        h.controller.discard_unsaved().unwrap();
        assert_ok!(h.controller.start().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_start_notification_pending() {
        let device = Arc::new(LaggingDevice::new());
        let repo = Arc::new(InMemorySessionRepository::new());
        let controller = SessionController::with_defaults(
            AuthContext::signed_in("user-1"),
            device.clone(),
            repo.clone(),
        )
        .unwrap();

        let (started, stopped) = tokio::join!(controller.start(), async {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            let stopped = controller.stop().await;
            (device.start_answered.load(Ordering::SeqCst), stopped)
        });
        let (answered_before_stop, stopped) = stopped;

        assert!(!answered_before_stop);
        assert!(device.start_answered.load(Ordering::SeqCst));
        // the late start failure is only logged
        assert_ok!(started);
        assert_eq!(stopped.unwrap().record.duration, 1);
        assert_eq!(controller.phase().unwrap(), SessionPhase::Idle);
        assert_eq!(repo.list_by_user("user-1").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(controller.elapsed_seconds().unwrap(), 1);
    }

    #[test]
    fn test_leave_stopping_keeps_other_phases() {
        let mut live = LiveSession::new(&SessionConfig::default());
        live.phase = SessionPhase::Active;
        live.leave_stopping();
        assert_eq!(live.phase, SessionPhase::Active);

        live.phase = SessionPhase::Stopping;
        live.leave_stopping();
        assert_eq!(live.phase, SessionPhase::Idle);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let device = Arc::new(SimulatedDevice::connected());
        let repo = Arc::new(InMemorySessionRepository::new());
        let result = SessionController::with_defaults(AuthContext::signed_in("u"), device, repo);
        assert!(result.is_err());
    }

    #[test]
    fn test_stale_generation_does_not_tick() {
        let mut live = LiveSession::new(&SessionConfig::default());
        assert!(!live.tick(0));
        live.phase = SessionPhase::Active;
        live.generation = 2;
        assert!(!live.tick(1));
        assert!(live.tick(2));
        assert_eq!(live.elapsed_seconds, 1);
    }
}
