// src/session/poller.rs - Background status refresh and auto-reports
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{SessionState, Shared};
use crate::client::{ClientError, StatusSnapshot};
use crate::print_job::{JobPhase, PhaseEvent, SelectedFile, PLACEHOLDER_JOB_NAME};
use crate::protocol::response;

/// Consecutive refresh failures logged as warnings before the outage is
/// reported once and further failures drop to debug.
const LOUD_FAILURES: u32 = 3;

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl Shared {
    pub(super) fn spawn_poller(
        self: Arc<Self>,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = if period < MIN_POLL_INTERVAL {
                tracing::warn!(
                    "Poll interval {:?} too short, using {:?}",
                    period,
                    MIN_POLL_INTERVAL
                );
                MIN_POLL_INTERVAL
            } else {
                period
            };
            tracing::info!("Starting status poller (interval={:?})", period);
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Status poller shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_cycle().await;
                    }
                }
            }
        })
    }

    pub(super) async fn poll_cycle(&self) {
        if self.state.lock().await.connected {
            match self.client.refresh_status().await {
                Ok(status) => {
                    let mut state = self.state.lock().await;
                    let lines = state.apply_status(&status);
                    self.queue.push_all(lines);
                }
                Err(e) => self.state.lock().await.record_refresh_failure(&e),
            }
        }
        self.auto_report().await;
    }

    /// Temperature-only refresh used by `M105`; the job phase is left alone.
    pub(super) async fn refresh_temperatures(&self) {
        if !self.state.lock().await.connected {
            return;
        }
        match self.client.refresh_status().await {
            Ok(status) => {
                let mut state = self.state.lock().await;
                state.temperatures.apply(&status);
                state.connection_errors = 0;
            }
            Err(e) => self.state.lock().await.record_refresh_failure(&e),
        }
    }

    async fn auto_report(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let has_job = state.has_job();

        if state.auto_temp.enabled || has_job {
            // While a job runs without M155, report on every cycle
            let interval = if state.auto_temp.enabled { state.auto_temp.interval_secs } else { 0 };
            if state.auto_temp.due(now, interval) {
                self.queue.push(response::temperature_report(&state.temperatures));
                state.auto_temp.last = Some(now);
            }
        }

        let sd_interval = state.auto_sd.interval_secs;
        if state.auto_sd.enabled && sd_interval > 0 && state.auto_sd.due(now, sd_interval) {
            let line = if has_job {
                state.sd_progress_line()
            } else {
                "Not SD printing".to_string()
            };
            self.queue.push(line);
            state.auto_sd.last = Some(now);
        }
    }
}

impl SessionState {
    /// Fold one refresh into the cache and return the notifications it causes.
    pub(super) fn apply_status(&mut self, status: &StatusSnapshot) -> Vec<String> {
        if self.connection_errors > LOUD_FAILURES {
            tracing::info!("Printer reachable again after {} failed refreshes", self.connection_errors);
        }
        self.connection_errors = 0;
        self.temperatures.apply(status);

        let phase = JobPhase::from_status(status);
        let device_name = status.job_name.trim();
        // The device can take a refresh or two to act on a local abort
        let aborting = self.tracker.is_aborted_job(phase, Some(device_name));
        self.printing = !aborting
            && matches!(phase, JobPhase::Preparing | JobPhase::Building | JobPhase::Resuming);
        self.paused = !aborting && phase == JobPhase::Paused;
        self.progress = status.progress;
        self.elapsed_secs = status.elapsed_secs;
        self.remaining_secs = status.remaining_secs;
        self.layer = status.layer;
        self.door_open = status.door_open;
        self.filament = status.filament.trim().to_string();
        self.fan_speed = status.fan_speed;

        if phase.is_active() && !aborting && !device_name.is_empty() {
            self.sync_active_job(device_name);
        }
        // Before the device names its job, a file we started ourselves stands in
        let job_name = if device_name.is_empty() {
            self.selected.remote_name.clone()
        } else {
            device_name.to_string()
        };

        let mut lines = Vec::new();
        for event in self.tracker.observe(phase, Some(job_name.as_str())) {
            match event {
                PhaseEvent::JobOpened { name, placeholder } => {
                    let (shown, size) = self.announced_file(&name, placeholder);
                    tracing::info!("Job opened: {} ({} bytes)", shown, size);
                    lines.push(response::file_opened(&shown, size));
                    lines.push("File selected".to_string());
                }
                PhaseEvent::JobFinished { phase } => {
                    let progress = if phase == JobPhase::Completed { 100.0 } else { self.progress };
                    lines.push(response::sd_progress(progress, self.selected.size));
                    lines.push("Not SD printing".to_string());
                    tracing::info!("Print job finished ({:?}) - resetting targets", phase);
                    self.selected.clear();
                    self.temperatures.reset_targets();
                    self.printing = false;
                    self.paused = false;
                }
            }
        }
        lines
    }

    /// Point the selection at the job the device reports, mapping the
    /// device-assigned name back through the SD index.
    fn sync_active_job(&mut self, remote: &str) {
        if self.selected.remote_name.eq_ignore_ascii_case(remote) && !self.selected.display_name.is_empty() {
            return;
        }
        self.selected = match self.sd_index.find_by_remote(remote) {
            Some(entry) => SelectedFile::new(&entry.display, &entry.remote, entry.size),
            None => SelectedFile::new(remote, remote, 0),
        };
        tracing::debug!("Active job synced to {}", self.selected.display_name);
    }

    fn announced_file(&self, name: &str, placeholder: bool) -> (String, u64) {
        if placeholder {
            return (PLACEHOLDER_JOB_NAME.to_string(), 0);
        }
        if self.selected.remote_name.eq_ignore_ascii_case(name) && !self.selected.display_name.is_empty() {
            return (self.selected.display_name.clone(), self.selected.size);
        }
        (name.to_string(), 0)
    }

    pub(super) fn record_refresh_failure(&mut self, error: &ClientError) {
        self.connection_errors = self.connection_errors.saturating_add(1);
        let attempt = self.connection_errors;
        if attempt <= LOUD_FAILURES {
            tracing::warn!("Error refreshing status (attempt {}): {}", attempt, error);
        } else if attempt == LOUD_FAILURES + 1 {
            tracing::error!("Persistent connection errors - printer may be offline: {}", error);
        } else {
            tracing::debug!("Error refreshing status: {}", error);
        }
    }
}
