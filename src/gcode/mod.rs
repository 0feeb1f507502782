// src/gcode/mod.rs
//
// Command code table. Every code the bridge understands maps to one Handler;
// anything else is acknowledged with a bare `ok` so generic GCode streams
// keep flowing.
use crate::temperature::Zone;

#[derive(Debug, Clone, PartialEq)]
pub struct GCodeCommand {
    /// Upper-cased command code, e.g. `M104`.
    pub code: String,
    /// Everything after the code, untouched (file names keep their case).
    pub args: String,
}

impl GCodeCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (code, args) = match line.split_once(char::is_whitespace) {
            Some((code, args)) => (code, args.trim()),
            None => (line, ""),
        };
        if code.is_empty() {
            return None;
        }
        Some(Self {
            code: code.to_ascii_uppercase(),
            args: args.to_string(),
        })
    }

    /// Numeric value of the first `<letter><number>` word, e.g. `S200`.
    pub fn param(&self, letter: char) -> Option<f64> {
        self.args.split_whitespace().find_map(|word| {
            let mut chars = word.chars();
            let head = chars.next()?;
            if !head.eq_ignore_ascii_case(&letter) {
                return None;
            }
            chars.as_str().parse::<f64>().ok()
        })
    }

    /// First of several letters that carries a value (`M109 S..` or `M109 R..`).
    pub fn param_any(&self, letters: &[char]) -> Option<f64> {
        letters.iter().find_map(|letter| self.param(*letter))
    }

    /// Free-text argument (file name, message), `None` when blank.
    pub fn text(&self) -> Option<&str> {
        let text = self.args.trim();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Motion, tuning and housekeeping codes the device has no surface for.
    Acknowledge,
    ReportTemperatures,
    ReportPosition,
    ReportFirmware,
    ReportEndstops,
    ReportPrintTime,
    ReportSettings,
    ReportStepsPerUnit,
    ReportLayerProgress,
    Echo,
    BedLeveling,
    SetTemperature { zone: Zone, wait: bool },
    ListFiles,
    SelectFile,
    StartOrResume,
    Pause,
    SdStatus,
    SelectAndStart,
    Abort,
    EmergencyStop,
    SetProgress,
    AutoReportTemperatures,
    SetLineNumber,
}

impl Handler {
    pub fn for_code(code: &str) -> Option<Self> {
        let handler = match code {
            "G0" | "G1" | "G4" | "G10" | "G11" | "G28" | "G90" | "G91" | "G92" => Self::Acknowledge,
            "M17" | "M18" | "M84" | "M82" | "M83" | "M400" => Self::Acknowledge,
            "M21" | "M22" | "M26" => Self::Acknowledge,
            "M75" | "M76" | "M77" | "M106" | "M107" | "M108" | "M117" | "M999" => Self::Acknowledge,
            "M201" | "M203" | "M204" | "M205" | "M211" | "M220" | "M221" | "M301" | "M304" => {
                Self::Acknowledge
            }
            "M420" | "M500" | "M501" | "M502" | "M851" | "M862" | "T0" | "T1" => Self::Acknowledge,
            "M105" => Self::ReportTemperatures,
            "M114" => Self::ReportPosition,
            "M115" => Self::ReportFirmware,
            "M119" => Self::ReportEndstops,
            "M31" => Self::ReportPrintTime,
            "M503" => Self::ReportSettings,
            "M92" => Self::ReportStepsPerUnit,
            "M532" => Self::ReportLayerProgress,
            "M118" => Self::Echo,
            "G29" => Self::BedLeveling,
            "M104" => Self::SetTemperature { zone: Zone::Tool, wait: false },
            "M109" => Self::SetTemperature { zone: Zone::Tool, wait: true },
            "M140" => Self::SetTemperature { zone: Zone::Bed, wait: false },
            "M190" => Self::SetTemperature { zone: Zone::Bed, wait: true },
            "M20" => Self::ListFiles,
            "M23" => Self::SelectFile,
            "M24" => Self::StartOrResume,
            "M25" | "M0" | "M1" | "M600" => Self::Pause,
            "M27" => Self::SdStatus,
            "M32" => Self::SelectAndStart,
            "M524" => Self::Abort,
            "M112" => Self::EmergencyStop,
            "M73" => Self::SetProgress,
            "M155" => Self::AutoReportTemperatures,
            "M110" => Self::SetLineNumber,
            _ => return None,
        };
        Some(handler)
    }
}
