// src/print_job.rs
//
// Print-job lifecycle as observed from the device. Command handlers only ask
// the device to change state; the tracker here confirms transitions from
// status refreshes and decides which notifications the host should see.
use crate::client::StatusSnapshot;

/// Name announced when the device has not reported its job name yet.
pub const PLACEHOLDER_JOB_NAME: &str = "Unknown.gcode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Preparing,
    Building,
    Paused,
    Resuming,
    Completed,
    Abort,
    Cancelling,
    Error,
    Busy,
    Offline,
}

impl JobPhase {
    pub fn parse(word: &str) -> Option<Self> {
        let phase = match word.trim().to_ascii_lowercase().as_str() {
            "idle" | "ready" | "" => Self::Idle,
            "preparing" | "heating" => Self::Preparing,
            "building" | "printing" => Self::Building,
            "paused" | "pausing" => Self::Paused,
            "resuming" => Self::Resuming,
            "completed" | "completing" | "complete" => Self::Completed,
            "abort" | "aborted" | "aborting" => Self::Abort,
            "cancelling" | "canceling" | "cancelled" | "canceled" => Self::Cancelling,
            "error" => Self::Error,
            "busy" => Self::Busy,
            "offline" => Self::Offline,
            _ => return None,
        };
        Some(phase)
    }

    /// Phase of a refresh; unrecognized words fall back to the printing/paused flags.
    pub fn from_status(status: &StatusSnapshot) -> Self {
        let parsed = Self::parse(&status.job_status);
        match parsed {
            Some(phase) if phase.is_active() || !(status.printing || status.paused) => phase,
            _ if status.paused => Self::Paused,
            _ if status.printing => Self::Building,
            Some(phase) => phase,
            None => Self::Idle,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparing | Self::Building | Self::Paused | Self::Resuming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abort | Self::Cancelling)
    }
}

/// The file currently targeted for printing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedFile {
    pub display_name: String,
    pub remote_name: String,
    pub size: u64,
}

impl SelectedFile {
    pub fn new(display_name: &str, remote_name: &str, size: u64) -> Self {
        Self {
            display_name: display_name.to_string(),
            remote_name: remote_name.to_string(),
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remote_name.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    /// A job became active (or its real name replaced the placeholder).
    JobOpened { name: String, placeholder: bool },
    /// The active job ended; `phase` is the phase that ended it.
    JobFinished { phase: JobPhase },
}

#[derive(Debug, Clone, PartialEq)]
struct AnnouncedJob {
    name: String,
    placeholder: bool,
}

/// A job aborted locally that the device may still report as active for a
/// few refreshes. `name: None` matches any job.
#[derive(Debug, Clone, PartialEq)]
struct AbortedJob {
    name: Option<String>,
}

impl AbortedJob {
    fn matches(&self, job_name: Option<&str>) -> bool {
        match (&self.name, job_name) {
            (Some(aborted), Some(name)) => aborted.eq_ignore_ascii_case(name),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    phase: JobPhase,
    announced: Option<AnnouncedJob>,
    completion_announced: bool,
    aborted: Option<AbortedJob>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// True when an active reading still belongs to a job aborted locally.
    pub fn is_aborted_job(&self, phase: JobPhase, job_name: Option<&str>) -> bool {
        let name = job_name.map(str::trim).filter(|name| !name.is_empty());
        phase.is_active() && self.aborted.as_ref().is_some_and(|job| job.matches(name))
    }

    /// Feed the phase and job name from one refresh.
    pub fn observe(&mut self, phase: JobPhase, job_name: Option<&str>) -> Vec<PhaseEvent> {
        let previous = self.phase;
        self.phase = phase;
        if previous != phase {
            tracing::info!("Job phase {:?} -> {:?}", previous, phase);
        }

        let mut events = Vec::new();
        if self.is_aborted_job(phase, job_name) {
            tracing::debug!("Ignoring {:?} reading for aborted job", phase);
            return events;
        }
        if phase.is_active() {
            self.aborted = None;
            self.completion_announced = false;
            let real_name = job_name.map(str::trim).filter(|name| !name.is_empty());
            let announce = match (&self.announced, real_name) {
                (None, _) => true,
                (Some(job), Some(name)) => job.placeholder || !job.name.eq_ignore_ascii_case(name),
                (Some(_), None) => false,
            };
            if announce {
                let job = AnnouncedJob {
                    name: real_name.unwrap_or(PLACEHOLDER_JOB_NAME).to_string(),
                    placeholder: real_name.is_none(),
                };
                events.push(PhaseEvent::JobOpened {
                    name: job.name.clone(),
                    placeholder: job.placeholder,
                });
                self.announced = Some(job);
            }
            return events;
        }

        // Busy/offline readings say nothing about the job; keep what we know.
        if matches!(phase, JobPhase::Busy | JobPhase::Offline) {
            return events;
        }

        let had_job = self.announced.take().is_some();
        if !self.completion_announced {
            // Aborts can come from the device's own panel before we ever saw the job.
            let finished = had_job || (phase.is_terminal() && phase != JobPhase::Completed);
            if finished {
                events.push(PhaseEvent::JobFinished { phase });
                self.completion_announced = true;
            } else if phase == JobPhase::Completed {
                // A completion for a job never seen active is absorbed silently.
                self.completion_announced = true;
            }
        }
        // Leaving the terminal phase re-arms the announcement for the next job
        if !phase.is_terminal() {
            self.completion_announced = false;
            self.aborted = None;
        }
        events
    }

    /// Forget the current job after a local abort so no later refresh
    /// announces it again. `aborted` names the job if known; active readings
    /// for it are ignored until the device leaves it.
    pub fn reset(&mut self, aborted: Option<&str>) {
        let name = aborted
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.announced
                    .as_ref()
                    .filter(|job| !job.placeholder)
                    .map(|job| job.name.clone())
            });
        let had_job = name.is_some() || self.announced.is_some();
        self.phase = JobPhase::Idle;
        self.announced = None;
        self.completion_announced = true;
        self.aborted = had_job.then_some(AbortedJob { name });
    }
}
