// src/session/commands.rs - GCode command handlers
//
// Every handler queues its reply lines and finishes with `ok`. Precondition
// failures become a single `Error:` line before the `ok`; remote failures are
// logged and leave the cached state as it was.
use super::{SessionState, Shared};
use crate::client::ControlRequest;
use crate::gcode::{GCodeCommand, Handler};
use crate::print_job::SelectedFile;
use crate::protocol::response::{self, OK};
use crate::temperature::Zone;

const STEPS_PER_UNIT: &str = "M92 X80.00 Y80.00 Z400.00 E93.00";

/// What `M24` should do given the current state.
enum StartAction {
    NotConnected,
    Resume,
    AlreadyPrinting,
    Print(SelectedFile),
    NoFileSelected,
}

impl Shared {
    pub(super) async fn dispatch(&self, command: &str) {
        let Some(cmd) = GCodeCommand::parse(command) else {
            self.queue.push(OK);
            return;
        };
        match Handler::for_code(&cmd.code) {
            Some(handler) => {
                tracing::debug!("Dispatching {} to {:?}", cmd.code, handler);
                self.handle(handler, &cmd).await;
            }
            None => {
                tracing::debug!("Unsupported command acknowledged: {}", command);
                self.queue.push(OK);
            }
        }
    }

    async fn handle(&self, handler: Handler, cmd: &GCodeCommand) {
        match handler {
            Handler::Acknowledge => self.queue.push(OK),
            Handler::ReportTemperatures => self.report_temperatures().await,
            Handler::ReportPosition => self.report_position().await,
            Handler::ReportFirmware => self.report_firmware().await,
            Handler::ReportEndstops => self.report_endstops().await,
            Handler::ReportPrintTime => {
                let elapsed = self.state.lock().await.elapsed_secs;
                self.reply([response::print_time(elapsed)]);
            }
            Handler::ReportSettings => self.reply([
                "echo:; Steps per unit:".to_string(),
                format!("echo:  {}", STEPS_PER_UNIT),
            ]),
            Handler::ReportStepsPerUnit => self.reply([format!("echo: {}", STEPS_PER_UNIT)]),
            Handler::ReportLayerProgress => {
                let state = self.state.lock().await;
                self.reply([format!("X:{:.1} L:{}", state.progress, state.layer)]);
            }
            Handler::Echo => match cmd.text() {
                Some(message) => self.reply([format!("echo:{}", message)]),
                None => self.queue.push(OK),
            },
            Handler::BedLeveling => {
                if self.state.lock().await.is_print_active() {
                    self.reject("Cannot level while printing");
                } else {
                    self.reply(["echo:Bed leveling not available via GCode"]);
                }
            }
            Handler::SetTemperature { zone, wait } => self.set_temperature(zone, wait, cmd).await,
            Handler::ListFiles => self.list_files().await,
            Handler::SelectFile => self.select_file(cmd).await,
            Handler::StartOrResume => self.start_or_resume().await,
            Handler::Pause => self.pause().await,
            Handler::SdStatus => self.sd_status(cmd).await,
            Handler::SelectAndStart => self.select_and_start(cmd).await,
            Handler::Abort => {
                tracing::info!("Aborting print (M524)");
                self.abort().await;
            }
            Handler::EmergencyStop => {
                tracing::error!("Emergency stop requested (M112)");
                self.abort().await;
            }
            Handler::SetProgress => {
                if let Some(percent) = cmd.param('P') {
                    self.state.lock().await.progress = percent.clamp(0.0, 100.0);
                }
                self.queue.push(OK);
            }
            Handler::AutoReportTemperatures => {
                if let Some(secs) = cmd.param('S') {
                    self.state.lock().await.auto_temp.configure(secs.max(0.0) as u64);
                }
                self.queue.push(OK);
            }
            Handler::SetLineNumber => {
                let line = cmd.param('N').unwrap_or(0.0).max(0.0) as u32;
                let mut state = self.state.lock().await;
                tracing::debug!(
                    "M110: line number {} -> {} (expected was {:?})",
                    state.decoder.current_line(),
                    line,
                    state.decoder.expected_line()
                );
                state.decoder.reset_line_number(line);
                drop(state);
                self.queue.push(OK);
            }
        }
    }

    fn reply<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue.push_all(lines);
        self.queue.push(OK);
    }

    fn reject(&self, message: &str) {
        tracing::warn!("Command refused: {}", message);
        self.reply([response::error(message)]);
    }

    async fn report_temperatures(&self) {
        self.refresh_temperatures().await;
        let line = response::temperature_reply(&self.state.lock().await.temperatures);
        self.queue.push(line);
    }

    async fn report_position(&self) {
        let state = self.state.lock().await;
        let layer = state.has_job().then_some(state.layer);
        self.reply([response::position_report(layer)]);
    }

    async fn report_firmware(&self) {
        if !self.state.lock().await.connected {
            self.reject("Not connected");
            return;
        }
        let refreshed = self.client.describe().await;
        let mut state = self.state.lock().await;
        match refreshed {
            Ok(info) => state.info = info,
            Err(e) => tracing::warn!("Failed to refresh printer info: {}", e),
        }
        self.queue
            .push(response::firmware_report(&state.info, &self.printer_name));
        self.reply(response::capabilities());
    }

    async fn report_endstops(&self) {
        let door = if self.state.lock().await.connected {
            match self.client.door_open().await {
                Ok(open) => Some(open),
                Err(e) => {
                    tracing::debug!("Door sensor refresh failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut state = self.state.lock().await;
        if let Some(open) = door {
            state.door_open = open;
        }
        let mut lines = vec![
            "Reporting endstop status".to_string(),
            "x_min: open".to_string(),
            "y_min: open".to_string(),
            "z_min: open".to_string(),
            format!("door: {}", if state.door_open { "TRIGGERED" } else { "open" }),
        ];
        if !state.filament.is_empty() {
            lines.push(format!("filament: {}", state.filament));
        }
        self.reply(lines);
    }

    async fn set_temperature(&self, zone: Zone, wait: bool, cmd: &GCodeCommand) {
        if self.state.lock().await.is_print_active() {
            self.reject("Cannot change temperature while printing");
            return;
        }
        let letters: &[char] = if wait { &['S', 'R'] } else { &['S'] };
        let Some(requested) = cmd.param_any(letters) else {
            self.queue.push(OK);
            return;
        };
        let requested = requested as i64;
        let target = zone.clamp(requested);
        if i64::from(target) != requested {
            tracing::warn!(
                "{}: target {} clamped to safe range (0-{}): {}",
                cmd.code,
                requested,
                zone.max_temp(),
                target
            );
        }

        let request = match zone {
            Zone::Tool => ControlRequest::nozzle(target),
            Zone::Bed => ControlRequest::plate(target),
        };
        tracing::debug!("Sending {}", request);
        match self.client.control(request).await {
            Ok(()) => self.state.lock().await.temperatures.set_target(zone, target),
            Err(e) => tracing::error!("Failed to set {:?} temperature: {}", zone, e),
        }
        self.queue.push(OK);
    }

    async fn list_files(&self) {
        let state = self.state.lock().await;
        let mut files: Vec<(String, u64)> = state
            .sd_index
            .snapshot()
            .into_iter()
            .map(|entry| (entry.display, entry.size))
            .collect();
        // Surface the selected or running job even when it was not uploaded by us
        if !state.selected.is_empty() {
            let name = if state.selected.display_name.is_empty() {
                &state.selected.remote_name
            } else {
                &state.selected.display_name
            };
            if !files.iter().any(|(listed, _)| listed.eq_ignore_ascii_case(name)) {
                files.push((name.clone(), state.selected.size));
            }
        }
        tracing::debug!("M20: listing {} files", files.len());

        self.queue.push("Begin file list");
        self.queue
            .push_all(files.iter().map(|(name, size)| format!("{} {}", name, size)));
        self.reply(["End file list"]);
    }

    async fn select_file(&self, cmd: &GCodeCommand) {
        let mut state = self.state.lock().await;
        if state.is_print_active() {
            self.reject("Cannot select file while printing");
            return;
        }
        let Some(name) = cmd.text() else {
            self.reject("No file specified");
            return;
        };
        let Some(file) = resolve_file(&state, name) else {
            self.reject("File not found");
            return;
        };
        tracing::info!(
            "Selected file: {} (remote={}, size={})",
            file.display_name,
            file.remote_name,
            file.size
        );
        self.reply([
            response::file_opened(&file.display_name, file.size),
            "File selected".to_string(),
        ]);
        state.selected = file;
    }

    async fn select_and_start(&self, cmd: &GCodeCommand) {
        {
            let mut state = self.state.lock().await;
            if state.is_print_active() {
                self.reject("Cannot start new print while printing");
                return;
            }
            let Some(name) = cmd.text() else {
                self.reject("No file specified");
                return;
            };
            let Some(file) = resolve_file(&state, name) else {
                self.reject("File not found");
                return;
            };
            tracing::info!(
                "M32: selecting and starting {} (remote={})",
                file.display_name,
                file.remote_name
            );
            state.selected = file;
        }
        self.start_or_resume().await;
    }

    async fn start_or_resume(&self) {
        let action = {
            let state = self.state.lock().await;
            if !state.connected {
                StartAction::NotConnected
            } else if state.paused {
                StartAction::Resume
            } else if state.is_print_active() {
                StartAction::AlreadyPrinting
            } else if !state.selected.is_empty() {
                StartAction::Print(state.selected.clone())
            } else {
                StartAction::NoFileSelected
            }
        };

        match action {
            StartAction::NotConnected => self.reject("Not connected"),
            StartAction::AlreadyPrinting => self.reject("Print already in progress"),
            StartAction::NoFileSelected => self.reject("No file selected"),
            StartAction::Resume => {
                tracing::info!("Resuming paused print");
                match self.client.resume().await {
                    Ok(printing) => {
                        let mut state = self.state.lock().await;
                        state.paused = false;
                        state.printing = printing;
                        self.queue.push(OK);
                    }
                    Err(e) => {
                        tracing::error!("Failed to resume print: {}", e);
                        self.reply([response::error(&e.to_string())]);
                    }
                }
            }
            StartAction::Print(file) => {
                tracing::info!(
                    "Starting print: {} (remote={})",
                    file.display_name,
                    file.remote_name
                );
                // The printing flag is left to the next status refresh.
                match self.client.control(ControlRequest::Print(file.remote_name)).await {
                    Ok(()) => self.queue.push(OK),
                    Err(e) => {
                        tracing::error!("Failed to start print: {}", e);
                        self.reply([response::error(&e.to_string())]);
                    }
                }
            }
        }
    }

    async fn pause(&self) {
        let should_pause = {
            let state = self.state.lock().await;
            state.connected && state.printing && !state.paused
        };
        if should_pause {
            tracing::info!("Pausing print");
            match self.client.pause().await {
                Ok(()) => self.state.lock().await.paused = true,
                Err(e) => tracing::error!("Failed to pause print: {}", e),
            }
        } else {
            tracing::debug!("Pause requested but nothing is printing");
        }
        self.queue.push(OK);
    }

    async fn sd_status(&self, cmd: &GCodeCommand) {
        let mut state = self.state.lock().await;
        if let Some(secs) = cmd.param('S') {
            state.auto_sd.configure(secs.max(0.0) as u64);
            self.queue.push(OK);
            return;
        }
        // Reported from the poller's cache; no refresh round-trip per query
        let line = if state.has_job() {
            state.sd_progress_line()
        } else {
            "Not SD printing".to_string()
        };
        self.reply([line]);
    }

    async fn abort(&self) {
        if self.state.lock().await.connected {
            if let Err(e) = self.client.stop().await {
                tracing::error!("Failed to stop print: {}", e);
            }
        }
        let mut state = self.state.lock().await;
        state.printing = false;
        state.paused = false;
        let aborted = state.selected.remote_name.clone();
        state.selected.clear();
        state.tracker.reset(Some(aborted.as_str()));
        tracing::info!("Print aborted - job state reset");
        self.queue.push(OK);
    }
}

/// Display name first, then the device-assigned name, then the running job.
fn resolve_file(state: &SessionState, name: &str) -> Option<SelectedFile> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if let Some(entry) = state
        .sd_index
        .get(name)
        .or_else(|| state.sd_index.find_by_remote(name))
    {
        return Some(SelectedFile::new(&entry.display, &entry.remote, entry.size));
    }
    let selected = &state.selected;
    if !selected.is_empty() && selected.remote_name.eq_ignore_ascii_case(name) {
        let display = if selected.display_name.is_empty() { name } else { &selected.display_name };
        return Some(SelectedFile::new(display, &selected.remote_name, selected.size));
    }
    None
}
