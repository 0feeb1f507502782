//! # Virtual Serial Session
//!
//! A [`Session`] behaves like a Marlin printer on a serial port. Bytes written
//! to it are decoded into GCode lines and dispatched; replies, auto-reports and
//! job notifications are queued for [`Session::read_line`]. A background poller
//! refreshes the cached device status on a fixed interval.
//!
//! All mutable state lives in one [`SessionState`] behind a single lock. Remote
//! calls are never made while that lock is held: the call completes first and
//! its result is applied afterwards.

mod commands;
mod poller;
mod queue;

pub use queue::ResponseQueue;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::client::{ClientError, PrinterClient, PrinterInfo};
use crate::config::Config;
use crate::file_manager::{save_document, SdIndex, SdIndexEntry, SdIndexError};
use crate::print_job::{JobPhase, JobTracker, SelectedFile};
use crate::protocol::response;
use crate::protocol::{Decoded, LineDecoder};
use crate::temperature::Temperatures;

pub const PORT_NAME: &str = "DREMEL3D45";
pub const BAUD_RATE: u32 = 115_200;

const POLLER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not connected to printer")]
    NotConnected,
    #[error("Cannot upload while printing")]
    PrintActive,
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("SD index error: {0}")]
    Index(#[from] SdIndexError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Marlin-style periodic report (`M155 S<n>`, `M27 S<n>`).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AutoReport {
    enabled: bool,
    interval_secs: u64,
    last: Option<Instant>,
}

impl AutoReport {
    fn configure(&mut self, interval_secs: u64) {
        self.enabled = interval_secs > 0;
        self.interval_secs = interval_secs;
        self.last = None;
        tracing::debug!(
            "Auto-report {} (interval={}s)",
            if self.enabled { "enabled" } else { "disabled" },
            interval_secs
        );
    }

    fn due(&self, now: Instant, interval_secs: u64) -> bool {
        interval_secs == 0
            || self
                .last
                .is_none_or(|last| now.duration_since(last) >= Duration::from_secs(interval_secs))
    }
}

/// Everything the session knows about the device and the host connection.
#[derive(Debug)]
pub(crate) struct SessionState {
    connected: bool,
    info: PrinterInfo,
    temperatures: Temperatures,
    printing: bool,
    paused: bool,
    progress: f64,
    elapsed_secs: u64,
    remaining_secs: u64,
    layer: u32,
    door_open: bool,
    filament: String,
    fan_speed: u32,
    selected: SelectedFile,
    tracker: JobTracker,
    sd_index: SdIndex,
    decoder: LineDecoder,
    auto_temp: AutoReport,
    auto_sd: AutoReport,
    connection_errors: u32,
}

impl SessionState {
    fn new(sd_index: SdIndex) -> Self {
        Self {
            connected: false,
            info: PrinterInfo::default(),
            temperatures: Temperatures::default(),
            printing: false,
            paused: false,
            progress: 0.0,
            elapsed_secs: 0,
            remaining_secs: 0,
            layer: 0,
            door_open: false,
            filament: String::new(),
            fan_speed: 0,
            selected: SelectedFile::default(),
            tracker: JobTracker::new(),
            sd_index,
            decoder: LineDecoder::new(),
            auto_temp: AutoReport::default(),
            auto_sd: AutoReport::default(),
            connection_errors: 0,
        }
    }

    /// Printing and not paused: the state in which mutating commands are refused.
    fn is_print_active(&self) -> bool {
        self.printing && !self.paused
    }

    fn has_job(&self) -> bool {
        self.printing || self.paused
    }

    fn sd_progress_line(&self) -> String {
        response::sd_progress(self.progress, self.selected.size)
    }
}

/// Point-in-time view of a session, for callers outside the serial surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub connected: bool,
    pub printing: bool,
    pub paused: bool,
    pub phase: JobPhase,
    pub selected: SelectedFile,
    pub temperatures: Temperatures,
    pub progress: f64,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub layer: u32,
    pub door_open: bool,
    pub filament: String,
    pub fan_speed: u32,
    pub connection_errors: u32,
}

/// State shared between the caller side and the poller task.
pub(crate) struct Shared {
    state: Mutex<SessionState>,
    queue: ResponseQueue,
    client: Arc<dyn PrinterClient>,
    printer_name: String,
}

impl Shared {
    async fn process_line(&self, line: &str) {
        tracing::debug!("<<< {}", line);
        let decoded = self.state.lock().await.decoder.decode(line);
        match decoded {
            Decoded::EmergencyCancel => self.queue.push(response::OK),
            Decoded::Rejected(lines) => self.queue.push_all(lines),
            Decoded::Command(command) => self.dispatch(&command).await,
        }
    }

    /// Best-effort save of the SD index; failures are logged.
    async fn persist_index(&self) {
        let (path, document) = {
            let state = self.state.lock().await;
            match state.sd_index.path() {
                Some(path) => (path.to_path_buf(), state.sd_index.document()),
                None => return,
            }
        };
        if let Err(e) = save_document(&path, &document).await {
            tracing::warn!("Failed to save SD index to {}: {}", path.display(), e);
        }
    }
}

pub struct Session {
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
    poller: Mutex<Option<JoinHandle<()>>>,
    read_buffer: Mutex<Vec<u8>>,
    read_timeout: Duration,
    closed: AtomicBool,
}

impl Session {
    /// Open a session: load the SD index, queue the boot banner, identify the
    /// device and start the status poller.
    ///
    /// Never fails. A missing address or an unreachable device is reported
    /// on the response queue and leaves the session open but disconnected.
    pub async fn open(config: &Config, client: Arc<dyn PrinterClient>) -> Self {
        let sd_index = SdIndex::load(config.sd_index_path()).await;
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::new(sd_index)),
            queue: ResponseQueue::new(),
            client,
            printer_name: config.printer.name.clone(),
        });
        let (shutdown_tx, _) = broadcast::channel(1);
        let session = Self {
            shared,
            shutdown_tx,
            poller: Mutex::new(None),
            read_buffer: Mutex::new(Vec::new()),
            read_timeout: config.read_timeout(),
            closed: AtomicBool::new(false),
        };
        session.start(config.host(), config.poll_interval()).await;
        session
    }

    async fn start(&self, host: &str, poll_interval: Duration) {
        tracing::info!("Starting virtual serial for printer at '{}'", host);
        let queue = &self.shared.queue;
        if host.is_empty() {
            queue.push(response::error("No printer IP configured"));
            return;
        }

        queue.push("");
        queue.push("start");
        queue.push(format!("{} Virtual Serial", self.shared.printer_name));

        let info = match self.shared.client.describe().await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("Failed to connect to printer at {}: {}", host, e);
                queue.push(response::error(&format!("Connection failed - {}", e)));
                return;
            }
        };
        tracing::info!(
            "Connected to {} (firmware {}, serial {})",
            host,
            info.firmware_version,
            info.serial_number
        );

        {
            let mut state = self.shared.state.lock().await;
            queue.push(response::boot_firmware_line(&info.firmware_version));
            queue.push_all(response::boot_capabilities());
            queue.push(response::OK);
            state.connected = true;
            state.info = info;
        }

        let handle = self
            .shared
            .clone()
            .spawn_poller(poll_interval, self.shutdown_tx.subscribe());
        *self.poller.lock().await = Some(handle);
    }

    /// Feed raw bytes from the host. Returns the number of bytes consumed.
    pub async fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        if !self.is_open() {
            tracing::debug!("Write of {} bytes ignored on closed session", data.len());
            return 0;
        }
        let lines = self.shared.state.lock().await.decoder.feed(data);
        for line in lines {
            self.shared.process_line(&line).await;
        }
        data.len()
    }

    /// Next response line including its newline, or an empty string if none
    /// arrives within the read timeout.
    pub async fn read_line(&self) -> String {
        match self.shared.queue.pop(self.read_timeout).await {
            Some(line) => {
                tracing::debug!(">>> {}", line.trim_end());
                line
            }
            None => String::new(),
        }
    }

    /// Up to `size` bytes of response text.
    pub async fn read(&self, size: usize) -> Vec<u8> {
        if size == 0 {
            return Vec::new();
        }
        let mut buffer = self.read_buffer.lock().await;
        if buffer.is_empty() {
            let line = self.read_line().await;
            buffer.extend_from_slice(line.as_bytes());
        }
        let take = size.min(buffer.len());
        buffer.drain(..take).collect()
    }

    /// Bytes queued and not yet read.
    pub fn in_waiting(&self) -> usize {
        self.shared.queue.queued_bytes()
    }

    /// Discard queued responses.
    pub async fn reset_input_buffer(&self) {
        let cleared = self.shared.queue.clear().await;
        if cleared > 0 {
            tracing::debug!("Input buffer reset - cleared {} queued responses", cleared);
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn port_name(&self) -> &'static str {
        PORT_NAME
    }

    pub fn baud_rate(&self) -> u32 {
        BAUD_RATE
    }

    /// Upload a local file to the device, record it in the SD index and select it.
    pub async fn upload_file(
        &self,
        local_path: &Path,
        display_name: Option<&str>,
    ) -> Result<SdIndexEntry, SessionError> {
        tracing::info!("Upload requested: {}", local_path.display());
        {
            let state = self.shared.state.lock().await;
            if !state.connected {
                tracing::error!("Cannot upload: not connected to printer");
                return Err(SessionError::NotConnected);
            }
            if state.is_print_active() {
                tracing::error!("Cannot upload: print in progress");
                return Err(SessionError::PrintActive);
            }
        }

        let content = tokio::fs::read(local_path).await?;
        let size = content.len() as u64;
        let display = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                local_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "upload.gcode".to_string());

        let remote = self.shared.client.upload(&display, content).await?;
        tracing::info!(
            "Uploaded {} as {} ({} bytes)",
            local_path.display(),
            remote,
            size
        );
        let entry = SdIndexEntry {
            display: display.clone(),
            remote: remote.clone(),
            size,
        };

        {
            let mut state = self.shared.state.lock().await;
            state.sd_index.insert(entry.clone());
            state.selected = SelectedFile::new(&display, &remote, size);
        }
        self.shared.persist_index().await;
        Ok(entry)
    }

    /// Forget every uploaded file. The current selection is kept since it may
    /// be the running job.
    pub async fn clear_sd_index(&self) -> usize {
        let count = self.shared.state.lock().await.sd_index.clear();
        tracing::info!("Cleared {} entries from SD index", count);
        self.shared.persist_index().await;
        count
    }

    pub async fn sd_index_snapshot(&self) -> Vec<SdIndexEntry> {
        self.shared.state.lock().await.sd_index.snapshot()
    }

    /// Run one poll cycle now, outside the poller's schedule.
    pub async fn poll_once(&self) {
        self.shared.poll_cycle().await;
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.shared.state.lock().await;
        SessionStatus {
            connected: state.connected,
            printing: state.printing,
            paused: state.paused,
            phase: state.tracker.phase(),
            selected: state.selected.clone(),
            temperatures: state.temperatures.clone(),
            progress: state.progress,
            elapsed_secs: state.elapsed_secs,
            remaining_secs: state.remaining_secs,
            layer: state.layer,
            door_open: state.door_open,
            filament: state.filament.clone(),
            fan_speed: state.fan_speed,
            connection_errors: state.connection_errors,
        }
    }

    /// Stop the poller and drop buffered data. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing virtual serial session");
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.poller.lock().await.take() {
            match tokio::time::timeout(POLLER_JOIN_TIMEOUT, handle).await {
                Ok(_) => tracing::debug!("Status poller stopped"),
                Err(_) => tracing::warn!(
                    "Status poller did not stop within {:?}",
                    POLLER_JOIN_TIMEOUT
                ),
            }
        }
        {
            let mut state = self.shared.state.lock().await;
            state.connected = false;
            state.decoder.clear();
        }
        self.read_buffer.lock().await.clear();
        self.reset_input_buffer().await;
        tracing::info!("Virtual serial session closed");
    }
}
