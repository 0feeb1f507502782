// Shared fixtures for session tests: a scripted printer client and helpers
// for driving a session over its serial surface.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dremel_bridge::client::{
    ClientError, ControlRequest, PrinterClient, PrinterInfo, StatusSnapshot, ZoneReading,
};
use dremel_bridge::{Config, Session};

/// Records every call and answers status refreshes from a settable snapshot.
pub struct MockClient {
    info: PrinterInfo,
    status: Mutex<StatusSnapshot>,
    calls: Mutex<Vec<String>>,
    fail_describe: AtomicBool,
    fail_refresh: AtomicBool,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            info: PrinterInfo {
                title: "3D45".to_string(),
                firmware_version: "v3.0_R02.12.10".to_string(),
                serial_number: "D45A1234".to_string(),
            },
            status: Mutex::new(idle()),
            calls: Mutex::new(Vec::new()),
            fail_describe: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        let client = Self::new();
        client.fail_describe.store(true, Ordering::SeqCst);
        client
    }

    pub fn set_status(&self, status: StatusSnapshot) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_refresh_failing(&self, failing: bool) {
        self.fail_refresh.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    /// Calls other than status reads.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "refresh_status" && c != "describe" && c != "door_open")
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PrinterClient for MockClient {
    async fn describe(&self) -> Result<PrinterInfo, ClientError> {
        self.record("describe");
        if self.fail_describe.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(self.info.clone())
    }

    async fn refresh_status(&self) -> Result<StatusSnapshot, ClientError> {
        self.record("refresh_status");
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("timed out".to_string()));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn door_open(&self) -> Result<bool, ClientError> {
        self.record("door_open");
        Ok(self.status.lock().unwrap().door_open)
    }

    async fn pause(&self) -> Result<(), ClientError> {
        self.record("pause");
        Ok(())
    }

    async fn resume(&self) -> Result<bool, ClientError> {
        self.record("resume");
        Ok(true)
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.record("stop");
        Ok(())
    }

    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, ClientError> {
        self.record(format!("upload {} {}", file_name, content.len()));
        Ok(format!("r_{}", file_name.to_lowercase()))
    }

    async fn control(&self, request: ControlRequest) -> Result<(), ClientError> {
        self.record(request.to_string());
        Ok(())
    }
}

pub fn idle() -> StatusSnapshot {
    StatusSnapshot {
        extruder: ZoneReading { actual: 24.0, target: 0.0 },
        platform: ZoneReading { actual: 22.5, target: 0.0 },
        chamber: ZoneReading { actual: 21.0, target: 0.0 },
        job_status: "ready".to_string(),
        ..Default::default()
    }
}

pub fn with_phase(phase: &str, job_name: &str, progress: f64) -> StatusSnapshot {
    let printing = matches!(phase, "building" | "preparing" | "resuming");
    let paused = phase == "paused";
    StatusSnapshot {
        extruder: ZoneReading { actual: 215.0, target: 220.0 },
        platform: ZoneReading { actual: 60.0, target: 60.0 },
        job_status: phase.to_string(),
        printing,
        paused,
        progress,
        job_name: job_name.to_string(),
        ..idle()
    }
}

/// Host configured, poller parked far in the future, short reads.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.printer.host = "192.168.1.50".to_string();
    config.printer.poll_interval_secs = 3600;
    config.session.read_timeout_ms = 30;
    config
}

pub fn config_with_data_folder(dir: &Path) -> Config {
    let mut config = test_config();
    config.session.data_folder = Some(dir.to_path_buf());
    config
}

/// Open a session and discard the boot banner.
pub async fn open_session(client: &Arc<MockClient>) -> Session {
    open_session_with(test_config(), client).await
}

pub async fn open_session_with(config: Config, client: &Arc<MockClient>) -> Session {
    let session = Session::open(&config, client.clone()).await;
    drain(&session).await;
    client.clear_calls();
    session
}

/// Read queued lines until the queue stays empty for one read timeout.
pub async fn drain(session: &Session) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let line = session.read_line().await;
        if line.is_empty() {
            return lines;
        }
        lines.push(line.trim_end_matches('\n').to_string());
    }
}

/// Write one line and collect everything it produced.
pub async fn send(session: &Session, line: &str) -> Vec<String> {
    session.write(format!("{}\n", line).as_bytes()).await;
    drain(session).await
}

/// Apply a device status through one poll cycle and collect its output.
pub async fn poll_with(session: &Session, client: &MockClient, status: StatusSnapshot) -> Vec<String> {
    client.set_status(status);
    session.poll_once().await;
    drain(session).await
}

/// Write a local GCode file of `size` bytes and upload it through the session.
pub async fn upload(session: &Session, dir: &Path, name: &str, size: usize) -> String {
    let path = dir.join(name);
    std::fs::write(&path, vec![b';'; size]).unwrap();
    let entry = session.upload_file(&path, Some(name)).await.unwrap();
    entry.remote
}
