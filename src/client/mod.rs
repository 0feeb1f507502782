//! Capability interface to the remote printer.
//!
//! The session never talks HTTP itself. Everything it needs from the device
//! goes through [`PrinterClient`], which keeps the REST transport swappable
//! (and mockable in tests).

pub mod http;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Printer returned HTTP {0}")]
    Status(u16),
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Printer rejected request: {0}")]
    Rejected(String),
}

/// Identity of the connected device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrinterInfo {
    pub title: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// Actual reading plus the target the device reports for one heater zone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZoneReading {
    pub actual: f64,
    pub target: f64,
}

/// Everything one status refresh returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub extruder: ZoneReading,
    pub platform: ZoneReading,
    pub chamber: ZoneReading,
    /// Raw job phase word reported by the device ("building", "paused", ...).
    pub job_status: String,
    pub printing: bool,
    pub paused: bool,
    pub progress: f64,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub layer: u32,
    pub job_name: String,
    pub door_open: bool,
    pub filament: String,
    pub fan_speed: u32,
}

/// Key/value control requests without a typed endpoint on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    NozzleHeat(u32),
    StopNozzleHeat,
    PlateHeat(u32),
    StopPlateHeat,
    /// Start printing a file already stored on the device.
    Print(String),
}

impl ControlRequest {
    pub fn nozzle(target: u32) -> Self {
        if target == 0 { Self::StopNozzleHeat } else { Self::NozzleHeat(target) }
    }

    pub fn plate(target: u32) -> Self {
        if target == 0 { Self::StopPlateHeat } else { Self::PlateHeat(target) }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NozzleHeat(t) => write!(f, "NOZZLEHEAT={}", t),
            Self::StopNozzleHeat => f.write_str("STOPNOZZLEHEAT"),
            Self::PlateHeat(t) => write!(f, "PLATEHEAT={}", t),
            Self::StopPlateHeat => f.write_str("STOPPLATEHEAT"),
            Self::Print(remote) => write!(f, "PRINT={}", remote),
        }
    }
}

#[async_trait]
pub trait PrinterClient: Send + Sync {
    /// Connect and fetch the device identity.
    async fn describe(&self) -> Result<PrinterInfo, ClientError>;
    /// One round trip returning temperatures, job state and sensors.
    async fn refresh_status(&self) -> Result<StatusSnapshot, ClientError>;
    async fn door_open(&self) -> Result<bool, ClientError>;
    async fn pause(&self) -> Result<(), ClientError>;
    /// Resume a paused job. Returns whether the device reports it printing again.
    async fn resume(&self) -> Result<bool, ClientError>;
    async fn stop(&self) -> Result<(), ClientError>;
    /// Upload raw file content; returns the name the device assigned to it.
    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, ClientError>;
    async fn control(&self, request: ControlRequest) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_requests_render_as_command_words() {
        assert_eq!(ControlRequest::nozzle(215).to_string(), "NOZZLEHEAT=215");
        assert_eq!(ControlRequest::nozzle(0).to_string(), "STOPNOZZLEHEAT");
        assert_eq!(ControlRequest::plate(60).to_string(), "PLATEHEAT=60");
        assert_eq!(ControlRequest::plate(0).to_string(), "STOPPLATEHEAT");
        assert_eq!(
            ControlRequest::Print("a1b2.gcode".into()).to_string(),
            "PRINT=a1b2.gcode"
        );
    }
}
