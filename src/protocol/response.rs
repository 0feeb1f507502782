// src/protocol/response.rs - Marlin-style response lines
use crate::client::PrinterInfo;
use crate::temperature::Temperatures;

pub const OK: &str = "ok";
pub const FIRMWARE_NAME: &str = "Dremel3D45";

/// Total substituted when the selected file's size is unknown, so progress is
/// always reported as a bounded byte count.
pub const SYNTHETIC_FILE_SIZE: u64 = 1_000_000;

pub fn error(message: &str) -> String {
    format!("Error: {}", message)
}

/// `T:a /t B:a /t`, the auto-report form.
pub fn temperature_report(temps: &Temperatures) -> String {
    format!(
        "T:{:.1} /{:.1} B:{:.1} /{:.1}",
        temps.tool.actual, temps.tool.target, temps.bed.actual, temps.bed.target
    )
}

/// `ok T:a /t B:a /t C:a /t`, the M105 reply.
pub fn temperature_reply(temps: &Temperatures) -> String {
    format!(
        "ok {} C:{:.1} /{:.1}",
        temperature_report(temps),
        temps.chamber.actual,
        temps.chamber.target
    )
}

pub fn position_report(layer: Option<u32>) -> String {
    match layer {
        Some(layer) => format!("X:0.00 Y:0.00 Z:0.00 E:0.00 Layer:{}", layer),
        None => "X:0.00 Y:0.00 Z:0.00 E:0.00".to_string(),
    }
}

pub fn boot_firmware_line(firmware_version: &str) -> String {
    format!(
        "FIRMWARE_NAME:{} FIRMWARE_VERSION:{}",
        FIRMWARE_NAME,
        or_unknown(firmware_version)
    )
}

pub fn firmware_report(info: &PrinterInfo, fallback_title: &str) -> String {
    let title = if info.title.is_empty() { fallback_title } else { info.title.as_str() };
    let serial = or_unknown(&info.serial_number);
    format!(
        "FIRMWARE_NAME:{} MACHINE_TYPE:{} FIRMWARE_VERSION:{} SERIAL:{} UUID:{}",
        FIRMWARE_NAME,
        title,
        or_unknown(&info.firmware_version),
        serial,
        serial
    )
}

pub fn capability(name: &str, enabled: bool) -> String {
    format!("Cap:{}:{}", name, u8::from(enabled))
}

/// Capabilities advertised at boot.
pub fn boot_capabilities() -> Vec<String> {
    vec![
        capability("AUTOREPORT_TEMP", true),
        capability("AUTOREPORT_SD_STATUS", true),
    ]
}

/// Full capability list for M115.
pub fn capabilities() -> Vec<String> {
    let mut caps = boot_capabilities();
    for name in ["EEPROM", "VOLUMETRIC", "THERMAL_PROTECTION", "EMERGENCY_PARSER"] {
        caps.push(capability(name, false));
    }
    caps
}

/// Bytes printed so far, `round(progress% × total)`.
pub fn printed_bytes(progress: f64, total: u64) -> u64 {
    let fraction = progress.clamp(0.0, 100.0) / 100.0;
    (fraction * total as f64).round() as u64
}

/// `SD printing byte n/m`; an unknown size reports against [`SYNTHETIC_FILE_SIZE`].
pub fn sd_progress(progress: f64, file_size: u64) -> String {
    let total = if file_size > 0 { file_size } else { SYNTHETIC_FILE_SIZE };
    format!("SD printing byte {}/{}", printed_bytes(progress, total), total)
}

pub fn file_opened(name: &str, size: u64) -> String {
    format!("File opened: {} Size: {}", name, size)
}

pub fn print_time(elapsed_secs: u64) -> String {
    let h = elapsed_secs / 3600;
    let m = (elapsed_secs % 3600) / 60;
    let s = elapsed_secs % 60;
    format!("echo:Print time: {:02}:{:02}:{:02}", h, m, s)
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "Unknown" } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temperature::TemperatureReading;

    #[test]
    fn formats_temperatures() {
        let temps = Temperatures {
            tool: TemperatureReading { actual: 200.0, target: 210.0 },
            bed: TemperatureReading { actual: 60.04, target: 65.0 },
            chamber: TemperatureReading { actual: 30.0, target: 0.0 },
        };
        assert_eq!(temperature_report(&temps), "T:200.0 /210.0 B:60.0 /65.0");
        assert_eq!(
            temperature_reply(&temps),
            "ok T:200.0 /210.0 B:60.0 /65.0 C:30.0 /0.0"
        );
    }

    #[test]
    fn sd_progress_uses_real_size_when_known() {
        assert_eq!(sd_progress(50.0, 50_000), "SD printing byte 25000/50000");
        assert_eq!(sd_progress(100.0, 1234), "SD printing byte 1234/1234");
    }

    #[test]
    fn sd_progress_falls_back_to_synthetic_total() {
        assert_eq!(sd_progress(42.0, 0), "SD printing byte 420000/1000000");
        assert_eq!(sd_progress(150.0, 0), "SD printing byte 1000000/1000000");
    }

    #[test]
    fn print_time_is_hms() {
        assert_eq!(print_time(3725), "echo:Print time: 01:02:05");
    }

    #[test]
    fn firmware_report_fills_unknowns() {
        let info = PrinterInfo::default();
        assert_eq!(
            firmware_report(&info, "Dremel 3D45"),
            "FIRMWARE_NAME:Dremel3D45 MACHINE_TYPE:Dremel 3D45 FIRMWARE_VERSION:Unknown SERIAL:Unknown UUID:Unknown"
        );
        assert_eq!(capabilities().len(), 6);
        assert_eq!(capabilities()[3], "Cap:VOLUMETRIC:0");
    }
}
