//! HTTP implementation of [`PrinterClient`] for the Dremel 3D45 command endpoint.
//!
//! Every control word is POSTed as the raw body of `http://<host>/command`;
//! the device answers with a flat JSON document. Field names have drifted
//! across firmware releases, so documents are read leniently: a missing or
//! oddly typed field falls back to its default instead of failing the call.

use super::{ClientError, ControlRequest, PrinterClient, PrinterInfo, StatusSnapshot, ZoneReading};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const STATUS_COMMAND: &str = "GETPRINTERSTATUS";
const INFO_COMMAND: &str = "GETPRINTERINFO";
const PAUSE_COMMAND: &str = "PAUSE";
const RESUME_COMMAND: &str = "RESUME";
const CANCEL_COMMAND: &str = "CANCEL";

#[derive(Debug, Clone)]
pub struct DremelClient {
    http: Client,
    host: String,
}

impl DremelClient {
    pub fn new(host: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            host: host.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.host, path)
    }

    async fn command(&self, body: &str) -> Result<Value, ClientError> {
        tracing::debug!("REST {} -> {}", body, self.host);
        let response = self
            .http
            .post(self.url("command"))
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        read_document(response).await
    }
}

async fn read_document(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status(status.as_u16()));
    }
    let document: Value = response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    match document.get("message").and_then(Value::as_str) {
        Some(message) if !message.eq_ignore_ascii_case("success") && !message.is_empty() => {
            Err(ClientError::Rejected(message.to_string()))
        }
        _ => Ok(document),
    }
}

fn field<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| doc.get(*key))
}

fn number(doc: &Value, keys: &[&str]) -> f64 {
    match field(doc, keys) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

fn text(doc: &Value, keys: &[&str]) -> String {
    match field(doc, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn flag(doc: &Value, keys: &[&str]) -> bool {
    match field(doc, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true" | "open"),
        Some(_) => number(doc, keys) != 0.0,
        None => false,
    }
}

/// Decode a `GETPRINTERSTATUS` document.
pub fn parse_status(doc: &Value) -> StatusSnapshot {
    let job_status = text(doc, &["jobstatus", "status"]).to_ascii_lowercase();
    let printing = matches!(job_status.as_str(), "building" | "preparing" | "resuming");
    let paused = matches!(job_status.as_str(), "paused" | "pausing");
    StatusSnapshot {
        extruder: ZoneReading {
            actual: number(doc, &["extruder_temperature", "temperature"]),
            target: number(doc, &["extruder_target_temperature"]),
        },
        platform: ZoneReading {
            actual: number(doc, &["platform_temperature"]),
            target: number(doc, &["platform_target_temperature", "buildPlate_target_temperature"]),
        },
        chamber: ZoneReading {
            actual: number(doc, &["chamber_temperature"]),
            target: 0.0,
        },
        job_status,
        printing,
        paused,
        progress: number(doc, &["progress"]),
        elapsed_secs: number(doc, &["elaspedtime", "elapsedtime", "elapsed_time"]).max(0.0) as u64,
        remaining_secs: number(doc, &["remaining", "remaining_time"]).max(0.0) as u64,
        layer: number(doc, &["layer"]).max(0.0) as u32,
        job_name: text(doc, &["jobname", "job_name"]),
        door_open: flag(doc, &["door_open"]),
        filament: text(doc, &["filament_type ", "filament_type", "filament"]),
        fan_speed: number(doc, &["fanSpeed", "fan_speed"]).max(0.0) as u32,
    }
}

/// Decode a `GETPRINTERINFO` document.
pub fn parse_info(doc: &Value) -> PrinterInfo {
    PrinterInfo {
        title: text(doc, &["machine_type", "title", "model"]),
        firmware_version: text(doc, &["firmware_version", "firmware"]),
        serial_number: text(doc, &["SN", "serial_number"]),
    }
}

/// Name the device stores an upload under: the local stem made filesystem-safe.
fn remote_file_name(file_name: &str) -> String {
    let stem = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        format!("upload_{}.gcode", chrono::Utc::now().timestamp())
    } else {
        safe
    }
}

#[async_trait]
impl PrinterClient for DremelClient {
    async fn describe(&self) -> Result<PrinterInfo, ClientError> {
        let doc = self.command(INFO_COMMAND).await?;
        Ok(parse_info(&doc))
    }

    async fn refresh_status(&self) -> Result<StatusSnapshot, ClientError> {
        let doc = self.command(STATUS_COMMAND).await?;
        Ok(parse_status(&doc))
    }

    async fn door_open(&self) -> Result<bool, ClientError> {
        let doc = self.command(STATUS_COMMAND).await?;
        Ok(flag(&doc, &["door_open"]))
    }

    async fn pause(&self) -> Result<(), ClientError> {
        self.command(PAUSE_COMMAND).await.map(|_| ())
    }

    async fn resume(&self) -> Result<bool, ClientError> {
        self.command(RESUME_COMMAND).await?;
        Ok(true)
    }

    async fn stop(&self) -> Result<(), ClientError> {
        self.command(CANCEL_COMMAND).await.map(|_| ())
    }

    async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<String, ClientError> {
        let remote = remote_file_name(file_name);
        tracing::debug!("Uploading {} bytes to {} as {}", content.len(), self.host, remote);
        let part = reqwest::multipart::Part::bytes(content).file_name(remote.clone());
        let form = reqwest::multipart::Form::new().part("print_file", part);
        let response = self
            .http
            .post(self.url("print_file_uploads"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let doc = read_document(response).await?;
        let assigned = text(&doc, &["fileName", "file_name", "filename"]);
        Ok(if assigned.is_empty() { remote } else { assigned })
    }

    async fn control(&self, request: ControlRequest) -> Result<(), ClientError> {
        self.command(&request.to_string()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_building_status_document() {
        let doc = json!({
            "message": "success",
            "extruder_temperature": 219.5,
            "extruder_target_temperature": 220,
            "platform_temperature": "59",
            "platform_target_temperature": 60,
            "chamber_temperature": 31,
            "jobstatus": "building",
            "jobname": "a1b2.gcode",
            "progress": 42.5,
            "elaspedtime": 600,
            "remaining": 900,
            "layer": 12,
            "door_open": 1,
            "filament_type ": "PLA ",
            "fanSpeed": 80
        });
        let status = parse_status(&doc);
        assert!(status.printing);
        assert!(!status.paused);
        assert_eq!(status.job_status, "building");
        assert_eq!(status.extruder, ZoneReading { actual: 219.5, target: 220.0 });
        assert_eq!(status.platform.actual, 59.0);
        assert_eq!(status.chamber.actual, 31.0);
        assert_eq!(status.progress, 42.5);
        assert_eq!(status.elapsed_secs, 600);
        assert_eq!(status.layer, 12);
        assert_eq!(status.job_name, "a1b2.gcode");
        assert!(status.door_open);
        assert_eq!(status.filament, "PLA");
        assert_eq!(status.fan_speed, 80);
    }

    #[test]
    fn missing_fields_default() {
        let status = parse_status(&json!({ "status": "PAUSED" }));
        assert!(status.paused);
        assert!(!status.printing);
        assert_eq!(status.progress, 0.0);
        assert!(status.job_name.is_empty());
    }

    #[test]
    fn parses_info_document() {
        let info = parse_info(&json!({
            "SN": "D45A1234",
            "firmware_version": "v3.0_R02.12.10",
            "machine_type": "3D45"
        }));
        assert_eq!(info.serial_number, "D45A1234");
        assert_eq!(info.firmware_version, "v3.0_R02.12.10");
        assert_eq!(info.title, "3D45");
    }

    #[test]
    fn remote_names_are_sanitized() {
        assert_eq!(remote_file_name("/tmp/My Part (v2).gcode"), "My_Part__v2_.gcode");
        assert_eq!(remote_file_name("benchy.gcode"), "benchy.gcode");
        assert!(remote_file_name("").starts_with("upload_"));
    }
}
