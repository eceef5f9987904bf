//! High-level handle to a Mi Band session.
//!
//! [`MiBand`] runs a [`DeviceSession`] on its own task. Caller operations,
//! transport events and keep-alive ticks are all delivered to that task, so
//! the session state is only ever touched from one place. Decoded readings
//! are broadcast to subscribers, and heart rate measurements are forwarded
//! to the configured [`HealthRecordSink`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ble::central::BleTransport;
use crate::ble::transport::{DeviceHandle, Transport, TransportEvent};
use crate::config::SessionConfig;
use crate::data::{HeartRateReading, Reading};
use crate::error::{Error, Result};
use crate::health::{HealthRecordSink, HeartRateSample};
use crate::logging::{LogEntry, LogSink, TracingLogSink};
use crate::protocol::AlertMode;
use crate::scheduler::KeepAliveTick;
use crate::session::{DeviceSession, SessionState};

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests handled by the session task.
enum Command {
    StartScan(Reply<()>),
    Connect(usize, Reply<()>),
    Disconnect(Reply<()>),
    Reconnect(Reply<()>),
    UpdateStats(Reply<()>),
    StartMonitoring(Reply<()>),
    StopMonitoring(Reply<()>),
    MeasureHeartRate(Reply<()>),
    SetAlert(AlertMode, Reply<()>),
    State(oneshot::Sender<SessionState>),
    DiscoveredDevices(oneshot::Sender<Vec<DeviceHandle>>),
    ActiveDevice(oneshot::Sender<Option<DeviceHandle>>),
    Shutdown(oneshot::Sender<()>),
}

/// A Mi Band session.
pub struct MiBand {
    /// Command channel into the session task.
    commands: mpsc::Sender<Command>,
    /// Reading broadcast channel.
    reading_tx: broadcast::Sender<Reading>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
    /// Session task handle.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MiBand {
    /// Open the first Bluetooth adapter and start a session on it.
    ///
    /// Session activity is logged through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: SessionConfig, health: Arc<dyn HealthRecordSink>) -> Result<Self> {
        let (transport, events) = BleTransport::new(config.channel_capacity).await?;
        Ok(Self::spawn(
            Arc::new(transport),
            events,
            health,
            Arc::new(TracingLogSink),
            config,
        ))
    }

    /// Start a session on an existing transport.
    ///
    /// `events` must be the event stream of `transport`. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
        health: Arc<dyn HealthRecordSink>,
        log: Arc<dyn LogSink>,
        config: SessionConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (reading_tx, _) = broadcast::channel(config.reading_capacity.max(1));
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();

        let session = DeviceSession::new(transport, log.clone(), config, tick_tx);
        let worker = SessionTask {
            session,
            health,
            log,
            reading_tx: reading_tx.clone(),
        };

        let task = tokio::spawn(worker.run(command_rx, events, tick_rx));

        Self {
            commands,
            reading_tx,
            callback_counter: AtomicU64::new(0),
            task: Mutex::new(Some(task)),
        }
    }

    // === Operations ===

    /// Start scanning for bands.
    pub async fn start_scan(&self) -> Result<()> {
        self.request(Command::StartScan).await
    }

    /// Connect to the discovered band at `index`.
    pub async fn connect(&self, index: usize) -> Result<()> {
        self.request(|reply| Command::Connect(index, reply)).await
    }

    /// Disconnect from the band.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    /// Reconnect to a band that dropped the link.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Command::Reconnect).await
    }

    /// Re-read time, activity and battery.
    pub async fn update_stats(&self) -> Result<()> {
        self.request(Command::UpdateStats).await
    }

    /// Start continuous heart rate monitoring.
    pub async fn start_monitoring_heart_rate(&self) -> Result<()> {
        self.request(Command::StartMonitoring).await
    }

    /// Stop continuous heart rate monitoring.
    pub async fn stop_monitoring_heart_rate(&self) -> Result<()> {
        self.request(Command::StopMonitoring).await
    }

    /// Request a single heart rate measurement.
    pub async fn measure_heart_rate(&self) -> Result<()> {
        self.request(Command::MeasureHeartRate).await
    }

    /// Set the vibration alert level.
    pub async fn set_alert(&self, mode: AlertMode) -> Result<()> {
        self.request(|reply| Command::SetAlert(mode, reply)).await
    }

    // === State ===

    /// Current session state.
    pub async fn state(&self) -> Result<SessionState> {
        self.query(Command::State).await
    }

    /// Bands found while scanning.
    pub async fn discovered_devices(&self) -> Result<Vec<DeviceHandle>> {
        self.query(Command::DiscoveredDevices).await
    }

    /// The band held by the session, if any.
    pub async fn active_device(&self) -> Result<Option<DeviceHandle>> {
        self.query(Command::ActiveDevice).await
    }

    // === Readings ===

    /// Subscribe to decoded readings.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<Reading> {
        self.reading_tx.subscribe()
    }

    /// Register a callback for every decoded reading.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&Reading) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.reading_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(reading) => callback(&reading),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Reading callback lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Register a callback for heart rate readings.
    pub fn on_heart_rate<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(HeartRateReading) + Send + Sync + 'static,
    {
        self.on_reading(move |reading| {
            if let Some(heart_rate) = reading.as_heart_rate() {
                callback(heart_rate);
            }
        })
    }

    // === Lifecycle ===

    /// Stop the session task.
    ///
    /// Monitoring keep-alives stop. The link itself is left to the
    /// transport; call [`disconnect`](Self::disconnect) first to close it.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        info!("Band session shut down");
        Ok(())
    }

    async fn request(&self, make: impl FnOnce(Reply<()>) -> Command) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }
}

impl Drop for MiBand {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// The task that owns the session.
struct SessionTask {
    session: DeviceSession,
    health: Arc<dyn HealthRecordSink>,
    log: Arc<dyn LogSink>,
    reading_tx: broadcast::Sender<Reading>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<TransportEvent>,
        mut ticks: mpsc::UnboundedReceiver<KeepAliveTick>,
    ) {
        debug!("Band session task started");

        loop {
            // Transport events are applied before later caller commands.
            tokio::select! {
                biased;

                Some(event) = events.recv() => self.handle_event(event),
                Some(tick) = ticks.recv() => self.session.handle_keep_alive_tick(tick),
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.session.shutdown();
        debug!("Band session task ended");
    }

    /// Apply a command. Returns `false` when the task should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        let session = &mut self.session;

        match command {
            Command::StartScan(reply) => {
                let _ = reply.send(session.start_scan());
            }
            Command::Connect(index, reply) => {
                let _ = reply.send(session.connect(index));
            }
            Command::Disconnect(reply) => {
                let _ = reply.send(session.disconnect());
            }
            Command::Reconnect(reply) => {
                let _ = reply.send(session.reconnect());
            }
            Command::UpdateStats(reply) => {
                let _ = reply.send(session.update_stats());
            }
            Command::StartMonitoring(reply) => {
                let _ = reply.send(session.start_monitoring_heart_rate());
            }
            Command::StopMonitoring(reply) => {
                let _ = reply.send(session.stop_monitoring_heart_rate());
            }
            Command::MeasureHeartRate(reply) => {
                let _ = reply.send(session.measure_heart_rate());
            }
            Command::SetAlert(mode, reply) => {
                let _ = reply.send(session.set_alert(mode));
            }
            Command::State(reply) => {
                let _ = reply.send(session.state());
            }
            Command::DiscoveredDevices(reply) => {
                let _ = reply.send(session.discovered_devices().to_vec());
            }
            Command::ActiveDevice(reply) => {
                let _ = reply.send(session.active_device().cloned());
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(());
                return false;
            }
        }

        true
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let Some(reading) = self.session.handle_event(event) else {
            return;
        };

        if let Some(heart_rate) = reading.as_heart_rate() {
            if heart_rate.is_measurement() {
                self.record_heart_rate(heart_rate);
            }
        }

        // No subscribers is fine.
        let _ = self.reading_tx.send(reading);
    }

    fn record_heart_rate(&self, heart_rate: HeartRateReading) {
        let health = self.health.clone();
        let log = self.log.clone();
        let sample = HeartRateSample::now(f64::from(heart_rate.bpm));

        tokio::spawn(async move {
            if let Err(e) = health.record_heart_rate(sample).await {
                log.log(LogEntry::error("Health record: failed", e.to_string()));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::test_support::{Call, RecordingTransport};
    use crate::ble::transport::CharacteristicRef;
    use crate::ble::uuids::*;
    use crate::health::MemoryHealthRecords;
    use crate::logging::test_support::RecordingLogSink;
    use crate::logging::LogChannel;
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const BAND_ID: &str = "C8:0F:10:00:00:01";

    fn band() -> DeviceHandle {
        DeviceHandle::new(BAND_ID, Some("MI Band 2".to_string()))
    }

    struct FailingHealthRecords;

    #[async_trait]
    impl HealthRecordSink for FailingHealthRecords {
        async fn record_heart_rate(&self, _sample: HeartRateSample) -> Result<()> {
            Err(Error::HealthRecord {
                reason: "not authorized".to_string(),
            })
        }
    }

    struct Harness {
        band: MiBand,
        events: mpsc::Sender<TransportEvent>,
        transport: RecordingTransport,
        log: RecordingLogSink,
    }

    fn harness(health: Arc<dyn HealthRecordSink>) -> Harness {
        let transport = RecordingTransport::default();
        let log = RecordingLogSink::default();
        let (events, event_rx) = mpsc::channel(16);
        let band = MiBand::spawn(
            Arc::new(transport.clone()),
            event_rx,
            health,
            Arc::new(log.clone()),
            SessionConfig::default(),
        );
        Harness {
            band,
            events,
            transport,
            log,
        }
    }

    async fn make_ready(h: &Harness) {
        h.band.start_scan().await.unwrap();
        h.events
            .send(TransportEvent::DeviceDiscovered(band()))
            .await
            .unwrap();
        h.band.connect(0).await.unwrap();
        h.events
            .send(TransportEvent::Connected(band()))
            .await
            .unwrap();
        h.events
            .send(TransportEvent::CharacteristicsDiscovered {
                device: band(),
                characteristics: vec![
                    CharacteristicRef::new(BAND_ID, BATTERY_UUID),
                    CharacteristicRef::new(BAND_ID, HEART_RATE_MEASUREMENT_UUID),
                    CharacteristicRef::new(BAND_ID, HEART_RATE_CONTROL_POINT_UUID),
                    CharacteristicRef::new(BAND_ID, ALERT_LEVEL_UUID),
                ],
            })
            .await
            .unwrap();
        assert_eq!(h.band.state().await.unwrap(), SessionState::Ready);
        h.transport.take_calls();
    }

    async fn heart_rate(h: &Harness, bpm: u8) {
        h.events
            .send(TransportEvent::ValueUpdated {
                characteristic: CharacteristicRef::new(BAND_ID, HEART_RATE_MEASUREMENT_UUID),
                value: Bytes::from(vec![0x00, bpm]),
            })
            .await
            .unwrap();
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_flow() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        assert_eq!(h.band.state().await.unwrap(), SessionState::Idle);

        make_ready(&h).await;
        assert_eq!(h.band.active_device().await.unwrap(), Some(band()));
        assert_eq!(h.band.discovered_devices().await.unwrap(), vec![band()]);
    }

    #[tokio::test]
    async fn test_readings_are_broadcast() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        make_ready(&h).await;

        let mut readings = h.band.subscribe_readings();
        heart_rate(&h, 72).await;

        let reading = readings.recv().await.unwrap();
        assert_eq!(reading, Reading::HeartRate(HeartRateReading::new(72)));
    }

    #[tokio::test]
    async fn test_measurements_are_recorded() {
        let records = MemoryHealthRecords::new();
        let h = harness(Arc::new(records.clone()));
        make_ready(&h).await;

        heart_rate(&h, 0).await;
        heart_rate(&h, 72).await;
        // Round-trip through the task so both events are applied.
        h.band.state().await.unwrap();
        settle().await;

        let samples = records.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].bpm, 72.0);
    }

    #[tokio::test]
    async fn test_health_failure_is_logged() {
        let h = harness(Arc::new(FailingHealthRecords));
        make_ready(&h).await;

        heart_rate(&h, 64).await;
        h.band.state().await.unwrap();
        settle().await;

        let errors = h.log.on_channel(LogChannel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].title, "Health record: failed");
        assert!(errors[0].detail.contains("not authorized"));
    }

    #[tokio::test]
    async fn test_invalid_setup_is_returned() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));

        let error = assert_err!(h.band.start_monitoring_heart_rate().await);
        assert!(error.is_invalid_setup());
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_alert() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        make_ready(&h).await;

        assert_ok!(h.band.set_alert(AlertMode::Mild).await);
        assert_eq!(
            h.transport.calls(),
            vec![Call::Write(ALERT_LEVEL_UUID, vec![0x01], false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_runs_on_task() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        make_ready(&h).await;

        assert_ok!(h.band.start_monitoring_heart_rate().await);
        assert_eq!(h.transport.writes().len(), 2);

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(h.transport.writes().len(), 4);

        h.band.stop_monitoring_heart_rate().await.unwrap();
        assert_eq!(h.transport.writes().len(), 6);

        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(h.transport.writes().len(), 6);
    }

    #[tokio::test]
    async fn test_heart_rate_callback() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        make_ready(&h).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = h.band.on_heart_rate(move |reading| sink.lock().push(reading.bpm));
        settle().await;

        heart_rate(&h, 80).await;
        h.band.state().await.unwrap();
        settle().await;
        assert_eq!(*seen.lock(), vec![80]);

        handle.unregister();
        heart_rate(&h, 90).await;
        h.band.state().await.unwrap();
        settle().await;
        assert_eq!(*seen.lock(), vec![80]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let h = harness(Arc::new(MemoryHealthRecords::new()));
        assert_ok!(h.band.shutdown().await);

        assert!(matches!(
            h.band.start_scan().await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(h.band.state().await, Err(Error::SessionClosed)));
    }
}
