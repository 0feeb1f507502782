// src/temperature.rs
use crate::client::StatusSnapshot;

pub const EXTRUDER_MAX_TEMP: i64 = 280;
pub const BED_MAX_TEMP: i64 = 100;

/// (actual, target) pair for one zone, in °C.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureReading {
    pub actual: f64,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Tool,
    Bed,
}

impl Zone {
    pub fn max_temp(self) -> i64 {
        match self {
            Zone::Tool => EXTRUDER_MAX_TEMP,
            Zone::Bed => BED_MAX_TEMP,
        }
    }

    /// Clamp a requested target into the zone's safe range.
    pub fn clamp(self, requested: i64) -> u32 {
        requested.clamp(0, self.max_temp()) as u32
    }
}

/// Cached temperatures for the tool, bed and chamber.
///
/// Targets set by a command win over whatever the device reports until the
/// current print ends; the device is known to report stale targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Temperatures {
    pub tool: TemperatureReading,
    pub bed: TemperatureReading,
    pub chamber: TemperatureReading,
}

impl Temperatures {
    pub fn set_target(&mut self, zone: Zone, target: u32) {
        let reading = match zone {
            Zone::Tool => &mut self.tool,
            Zone::Bed => &mut self.bed,
        };
        reading.target = f64::from(target);
        tracing::info!("Setting {:?} target temperature: {}°C", zone, target);
    }

    /// Fold a device refresh into the cache.
    pub fn apply(&mut self, status: &StatusSnapshot) {
        self.tool = TemperatureReading {
            actual: status.extruder.actual,
            target: prefer_local(self.tool.target, status.extruder.target),
        };
        self.bed = TemperatureReading {
            actual: status.platform.actual,
            target: prefer_local(self.bed.target, status.platform.target),
        };
        self.chamber = TemperatureReading {
            actual: status.chamber.actual,
            target: 0.0,
        };
    }

    pub fn reset_targets(&mut self) {
        self.tool.target = 0.0;
        self.bed.target = 0.0;
        self.chamber.target = 0.0;
    }
}

fn prefer_local(local: f64, reported: f64) -> f64 {
    if local > 0.0 { local } else { reported }
}
