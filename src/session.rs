//! Device session state machine.
//!
//! A [`DeviceSession`] owns the lifecycle of one band connection:
//!
//! ```text
//! Idle -> Scanning -> Connecting -> Negotiating -> Ready
//!   ^________________________________________________|  (disconnect)
//! ```
//!
//! It is driven by two inputs: caller operations (scan, connect, update
//! stats, heart rate commands, alerts) and [`TransportEvent`]s. It is not
//! thread-safe by itself; the [`MiBand`](crate::band::MiBand) actor owns it
//! and feeds it from a single task.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::ble::transport::{
    AdapterState, CharacteristicRef, DeviceHandle, Transport, TransportEvent, TransportOperation,
};
use crate::config::SessionConfig;
use crate::data::Reading;
use crate::error::{Error, Result};
use crate::logging::{LogCategory, LogEntry, LogSink};
use crate::protocol::{decode, AlertMode, CharacteristicId, MonitorCommand};
use crate::scheduler::{HeartRateScheduler, KeepAliveTick};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No device and not scanning.
    #[default]
    Idle,
    /// Scanning for devices.
    Scanning,
    /// Waiting for a connection attempt to finish.
    Connecting,
    /// Connected, discovering characteristics.
    Negotiating,
    /// Characteristics negotiated; operations are available.
    Ready,
}

impl SessionState {
    /// Check if characteristic updates are expected in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Negotiating | Self::Ready)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// The connected device and the characteristics negotiated on it.
#[derive(Debug)]
struct ActiveDevice {
    handle: DeviceHandle,
    pollable: Vec<CharacteristicRef>,
    control_point: Option<CharacteristicRef>,
    alert: Option<CharacteristicRef>,
}

impl ActiveDevice {
    fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            pollable: Vec::new(),
            control_point: None,
            alert: None,
        }
    }

    fn owns(&self, device_id: &str) -> bool {
        self.handle.id() == device_id
    }
}

/// State machine for a single band session.
pub struct DeviceSession {
    transport: Arc<dyn Transport>,
    log: Arc<dyn LogSink>,
    config: SessionConfig,
    state: SessionState,
    discovered: Vec<DeviceHandle>,
    pending: Option<DeviceHandle>,
    active: Option<ActiveDevice>,
    scheduler: HeartRateScheduler,
}

impl DeviceSession {
    /// Create an idle session.
    ///
    /// Keep-alive ticks are posted to `ticks`; the owner must route them back
    /// into [`handle_keep_alive_tick`](Self::handle_keep_alive_tick).
    pub fn new(
        transport: Arc<dyn Transport>,
        log: Arc<dyn LogSink>,
        config: SessionConfig,
        ticks: mpsc::UnboundedSender<KeepAliveTick>,
    ) -> Self {
        let scheduler = HeartRateScheduler::new(config.keep_alive_period, ticks);

        Self {
            transport,
            log,
            config,
            state: SessionState::Idle,
            discovered: Vec::new(),
            pending: None,
            active: None,
            scheduler,
        }
    }

    // === Accessors ===

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Devices found while scanning, in discovery order.
    pub fn discovered_devices(&self) -> &[DeviceHandle] {
        &self.discovered
    }

    /// The device held by the session, if any.
    ///
    /// After a disconnect with a link error the handle is retained here while
    /// the state is `Idle`.
    pub fn active_device(&self) -> Option<&DeviceHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    /// Check if heart rate monitoring keep-alives are running.
    pub fn is_monitoring(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // === Operations ===

    /// Start scanning for devices.
    pub fn start_scan(&mut self) -> Result<()> {
        const OPERATION: &str = "Start scan";

        let can_scan = matches!(self.state, SessionState::Idle | SessionState::Scanning);
        if self.active.is_some() || !can_scan {
            return Err(self.invalid_setup(OPERATION));
        }

        self.transport
            .scan()
            .map_err(|e| self.transport_error(OPERATION, e))?;

        self.state = SessionState::Scanning;
        self.log_routine(LogCategory::Bluetooth, "Scanning", "");
        Ok(())
    }

    /// Connect to the discovered device at `index`.
    pub fn connect(&mut self, index: usize) -> Result<()> {
        const OPERATION: &str = "Connect";

        if self.state != SessionState::Scanning {
            return Err(self.invalid_setup(OPERATION));
        }

        let Some(device) = self.discovered.get(index).cloned() else {
            let count = self.discovered.len();
            self.log.log(LogEntry::error(
                format!("{}: no device at index {}", OPERATION, index),
                format!("{} discovered", count),
            ));
            return Err(Error::DeviceIndexOutOfRange { index, count });
        };

        self.transport
            .connect(&device)
            .map_err(|e| self.transport_error(OPERATION, e))?;

        self.log_routine(LogCategory::Connection, "Connecting to:", device.name());
        self.pending = Some(device);
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// Retry the connection to a device retained after a link error.
    pub fn reconnect(&mut self) -> Result<()> {
        const OPERATION: &str = "Reconnect";

        let device = match (&self.state, &self.active) {
            (SessionState::Idle, Some(active)) => active.handle.clone(),
            _ => return Err(self.invalid_setup(OPERATION)),
        };

        self.transport
            .connect(&device)
            .map_err(|e| self.transport_error(OPERATION, e))?;

        self.log_routine(LogCategory::Connection, "Reconnecting to:", device.name());
        self.pending = Some(device);
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// Tear down the connection.
    ///
    /// The session returns to `Idle` when the transport reports the
    /// disconnect.
    pub fn disconnect(&mut self) -> Result<()> {
        const OPERATION: &str = "Disconnect";

        let result = if let Some(pending) = &self.pending {
            self.transport.cancel_connection(pending)
        } else if let Some(active) = &self.active {
            if self.state.is_connected() {
                self.transport.disconnect(&active.handle)
            } else {
                self.transport.cancel_connection(&active.handle)
            }
        } else {
            return Err(self.invalid_setup(OPERATION));
        };

        result.map_err(|e| self.transport_error(OPERATION, e))?;
        self.log_routine(LogCategory::Connection, "Disconnecting", "");
        Ok(())
    }

    /// Read every pollable characteristic again.
    pub fn update_stats(&mut self) -> Result<()> {
        const OPERATION: &str = "Update stats";

        let pollable = self.ready_device(OPERATION)?.pollable.clone();
        self.log_routine(LogCategory::Stats, "Update stats", "");

        let mut result = Ok(());
        for characteristic in &pollable {
            if let Err(e) = self.transport.read_characteristic(characteristic) {
                result = Err(self.transport_error(OPERATION, e));
            }
        }
        result
    }

    /// Start continuous heart rate monitoring with periodic keep-alives.
    pub fn start_monitoring_heart_rate(&mut self) -> Result<()> {
        const OPERATION: &str = "Start monitoring";

        let control_point = self.control_point(OPERATION)?;
        let runtime = Handle::try_current().map_err(|e| self.internal_error(OPERATION, e))?;

        if let Err(e) = self.send_keep_alive(&control_point) {
            self.scheduler.disarm();
            return Err(e);
        }
        self.scheduler.arm(&runtime);

        self.log_routine(LogCategory::HeartRate, "Start monitoring HR", "");
        Ok(())
    }

    /// Stop continuous heart rate monitoring.
    pub fn stop_monitoring_heart_rate(&mut self) -> Result<()> {
        const OPERATION: &str = "Stop monitoring";

        let control_point = self.control_point(OPERATION)?;
        self.scheduler.disarm();
        self.write_command(&control_point, MonitorCommand::StopMonitoring)?;
        self.write_command(&control_point, MonitorCommand::StopMeasurement)?;

        self.log_routine(LogCategory::HeartRate, "Stop monitoring / measurement", "");
        Ok(())
    }

    /// Request a single heart rate measurement.
    pub fn measure_heart_rate(&mut self) -> Result<()> {
        const OPERATION: &str = "Single measurement";

        let control_point = self.control_point(OPERATION)?;
        self.write_command(&control_point, MonitorCommand::StartSingleMeasurement)?;

        self.log_routine(LogCategory::HeartRate, "Single measurement", "");
        Ok(())
    }

    /// Set the vibration alert level.
    pub fn set_alert(&mut self, mode: AlertMode) -> Result<()> {
        const OPERATION: &str = "Set alert";

        let alert = self
            .ready_device(OPERATION)?
            .alert
            .clone()
            .ok_or_else(|| self.invalid_setup(OPERATION))?;

        self.transport
            .write_characteristic(&alert, &[mode.byte()], false)
            .map_err(|e| self.transport_error(OPERATION, e))?;

        let title = match mode {
            AlertMode::Off => "Alert Off",
            AlertMode::Mild | AlertMode::High => "Alert On",
        };
        self.log_routine(LogCategory::Alert, title, format!("{:?}", mode));
        Ok(())
    }

    /// Stop the keep-alive timer. Called when the owner shuts down.
    pub fn shutdown(&mut self) {
        self.scheduler.disarm();
    }

    // === Events ===

    /// Apply a transport event.
    ///
    /// Returns the decoded reading when the event carried one.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<Reading> {
        match event {
            TransportEvent::AdapterStateChanged(state) => self.on_adapter_state(state),
            TransportEvent::DeviceDiscovered(device) => self.on_device_discovered(device),
            TransportEvent::Connected(device) => self.on_connected(device),
            TransportEvent::FailedToConnect { device, error } => {
                self.on_failed_to_connect(device, error)
            }
            TransportEvent::Disconnected { device, error } => self.on_disconnected(device, error),
            TransportEvent::CharacteristicsDiscovered {
                device,
                characteristics,
            } => self.on_characteristics_discovered(device, characteristics),
            TransportEvent::ValueUpdated {
                characteristic,
                value,
            } => return self.on_value_updated(&characteristic, &value),
            TransportEvent::OperationFailed {
                characteristic,
                operation,
                reason,
            } => self.on_operation_failed(&characteristic, operation, reason),
        }

        None
    }

    /// Apply a keep-alive tick. Ticks from a disarmed or replaced timer are
    /// dropped.
    pub fn handle_keep_alive_tick(&mut self, tick: KeepAliveTick) {
        if !self.scheduler.accepts(tick) {
            trace!("Dropping stale keep-alive tick {}", tick.generation);
            return;
        }

        let control_point = match self.active.as_ref() {
            Some(active) if self.state == SessionState::Ready => active.control_point.clone(),
            _ => None,
        };

        match control_point {
            Some(control_point) => {
                if self.send_keep_alive(&control_point).is_ok() {
                    self.log_routine(LogCategory::HeartRate, "Keep-alive HR monitoring", "");
                }
            }
            None => {
                debug!("Keep-alive tick without a ready control point, disarming");
                self.scheduler.disarm();
            }
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        self.log_routine(LogCategory::Bluetooth, "Bluetooth state:", state.to_string());

        if state == AdapterState::PoweredOn
            && self.active.is_none()
            && self.state == SessionState::Idle
        {
            // Failure is already logged.
            let _ = self.start_scan();
        }
    }

    fn on_device_discovered(&mut self, device: DeviceHandle) {
        if !self.config.accepts_device_name(device.name()) {
            trace!("Ignoring device {}", device);
            return;
        }

        if let Some(known) = self.discovered.iter_mut().find(|d| d.id() == device.id()) {
            *known = device;
            return;
        }

        self.log.log(LogEntry::notable(
            LogCategory::Discovery,
            "Discovered:",
            device.name(),
        ));
        self.discovered.push(device);
    }

    fn on_connected(&mut self, device: DeviceHandle) {
        let was_pending = self
            .pending
            .as_ref()
            .map(|pending| pending.id() == device.id())
            .unwrap_or(false);
        if self.state != SessionState::Connecting || !was_pending {
            debug!("Ignoring unrequested connect for {} ({})", device, self.state);
            return;
        }

        self.log_routine(LogCategory::Connection, "Connected to:", device.name());

        self.scheduler.disarm();
        self.pending = None;

        if let Err(e) = self.transport.stop_scan() {
            self.transport_error("Stop scan", e);
        }
        if let Err(e) = self.transport.discover_characteristics(&device) {
            self.transport_error("Discover characteristics", e);
        }

        self.active = Some(ActiveDevice::new(device));
        self.state = SessionState::Negotiating;
    }

    fn on_failed_to_connect(&mut self, device: DeviceHandle, error: String) {
        self.log.log(LogEntry::error(
            format!("Error: {}", error),
            device.name().to_string(),
        ));

        let was_pending = self
            .pending
            .as_ref()
            .map(|pending| pending.id() == device.id())
            .unwrap_or(false);
        if self.state != SessionState::Connecting || !was_pending {
            return;
        }

        self.pending = None;
        // A failed retry falls back to the retained handle.
        self.state = if self.active.is_some() {
            SessionState::Idle
        } else {
            SessionState::Scanning
        };
    }

    fn on_disconnected(&mut self, device: DeviceHandle, error: Option<String>) {
        let is_active = self
            .active
            .as_ref()
            .map(|active| active.owns(device.id()))
            .unwrap_or(false);
        let is_pending = self
            .pending
            .as_ref()
            .map(|pending| pending.id() == device.id())
            .unwrap_or(false);
        if !is_active && !is_pending {
            debug!("Ignoring disconnect of unrelated device {}", device);
            return;
        }

        let title = match &error {
            Some(error) => format!("Disconnected, with error: {}", error),
            None => "Disconnected".to_string(),
        };
        self.log_routine(LogCategory::Connection, title, device.name());

        self.scheduler.disarm();
        self.pending = None;
        if error.is_none() {
            self.active = None;
        }
        self.state = SessionState::Idle;
    }

    fn on_characteristics_discovered(
        &mut self,
        device: DeviceHandle,
        characteristics: Vec<CharacteristicRef>,
    ) {
        if !self.state.is_connected() {
            debug!("Ignoring characteristics outside negotiation ({})", self.state);
            return;
        }

        let transport = self.transport.clone();
        let log = self.log.clone();
        let Some(active) = self.active.as_mut().filter(|a| a.owns(device.id())) else {
            debug!("Ignoring characteristics of inactive device {}", device);
            return;
        };

        for characteristic in characteristics {
            if !active.owns(characteristic.device_id()) {
                continue;
            }
            let Some(id) = characteristic.characteristic_id() else {
                continue;
            };
            trace!("Negotiating {} ({})", id, characteristic.uuid());

            if id.is_pollable() {
                if let Err(e) = transport.read_characteristic(&characteristic) {
                    log.log(LogEntry::error(format!("Read {}: failed", id), e.to_string()));
                }
                if !active.pollable.contains(&characteristic) {
                    active.pollable.push(characteristic.clone());
                }
            }

            if id.is_subscribable() {
                if let Err(e) = transport.set_notify(&characteristic, true) {
                    log.log(LogEntry::error(format!("Notify {}: failed", id), e.to_string()));
                }
            }

            match id {
                CharacteristicId::HeartRateControlPoint => {
                    active.control_point = Some(characteristic)
                }
                CharacteristicId::Alert => active.alert = Some(characteristic),
                _ => {}
            }
        }

        let detail = format!(
            "{} pollable, control point: {}, alert: {}",
            active.pollable.len(),
            active.control_point.is_some(),
            active.alert.is_some()
        );
        self.state = SessionState::Ready;
        self.log_routine(LogCategory::Connection, "Ready", detail);
    }

    fn on_value_updated(
        &mut self,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Option<Reading> {
        let active = self.active.as_ref()?;
        if !self.state.is_connected() || !active.owns(characteristic.device_id()) {
            return None;
        }

        let id = characteristic
            .characteristic_id()
            .filter(CharacteristicId::carries_readings)?;

        trace!("New value {:02X?} for {}", value, id);

        match decode(id, value) {
            Ok(Some(reading)) => {
                self.log_reading(&reading);
                Some(reading)
            }
            Ok(None) => None,
            Err(e) => {
                self.log
                    .log(LogEntry::error(format!("Decode {}: failed", id), e.to_string()));
                None
            }
        }
    }

    fn on_operation_failed(
        &mut self,
        characteristic: &CharacteristicRef,
        operation: TransportOperation,
        reason: String,
    ) {
        let target = characteristic
            .characteristic_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| characteristic.uuid().to_string());
        self.log.log(LogEntry::error(
            format!("{} {}: failed", operation, target),
            reason,
        ));
    }

    // === Internal ===

    fn ready_device(&self, operation: &'static str) -> Result<&ActiveDevice> {
        match &self.active {
            Some(active) if self.state == SessionState::Ready => Ok(active),
            _ => Err(self.invalid_setup(operation)),
        }
    }

    fn control_point(&self, operation: &'static str) -> Result<CharacteristicRef> {
        self.ready_device(operation)?
            .control_point
            .clone()
            .ok_or_else(|| self.invalid_setup(operation))
    }

    fn send_keep_alive(&self, control_point: &CharacteristicRef) -> Result<()> {
        self.write_command(control_point, MonitorCommand::StopMonitoring)?;
        self.write_command(control_point, MonitorCommand::StartMonitoring)
    }

    fn write_command(
        &self,
        control_point: &CharacteristicRef,
        command: MonitorCommand,
    ) -> Result<()> {
        self.transport
            .write_characteristic(control_point, command.bytes(), true)
            .map_err(|e| self.transport_error("Heart rate command", e))
    }

    fn invalid_setup(&self, operation: &'static str) -> Error {
        self.log.log(LogEntry::error(
            format!("{}: Invalid setup!", operation),
            format!("state: {}", self.state),
        ));
        Error::InvalidSetup { operation }
    }

    fn internal_error(&self, operation: &str, error: impl std::fmt::Display) -> Error {
        self.log.log(LogEntry::error(
            format!("{}: failed", operation),
            error.to_string(),
        ));
        Error::Internal(error.to_string())
    }

    fn transport_error(&self, operation: &str, error: Error) -> Error {
        self.log.log(LogEntry::error(
            format!("{}: transport error", operation),
            error.to_string(),
        ));
        error
    }

    fn log_routine(
        &self,
        category: LogCategory,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) {
        self.log.log(LogEntry::routine(category, title, detail));
    }

    fn log_reading(&self, reading: &Reading) {
        let (category, title, detail) = match reading {
            Reading::Time(time) => (LogCategory::Time, "Time:", time.to_string()),
            Reading::HeartRate(heart_rate) => {
                (LogCategory::HeartRate, "Heart rate:", heart_rate.to_string())
            }
            Reading::Activity(activity) => {
                (LogCategory::Activity, "Distance:", activity.to_string())
            }
            Reading::Battery(battery) => (LogCategory::Battery, "Battery:", battery.to_string()),
        };
        self.log_routine(category, title, detail);
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state)
            .field("active", &self.active_device())
            .field("discovered", &self.discovered.len())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}
