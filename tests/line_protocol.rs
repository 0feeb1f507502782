mod common;

use common::*;
use dremel_bridge::protocol::checksum;
use dremel_bridge::{Config, Session};

fn numbered(n: u32, command: &str) -> String {
    let body = format!("N{} {}", n, command);
    format!("{}*{}", body, checksum(&body))
}

#[tokio::test]
async fn test_boot_sequence() {
    let client = MockClient::new();
    let session = Session::open(&test_config(), client.clone()).await;
    assert_eq!(
        drain(&session).await,
        vec![
            "",
            "start",
            "Dremel 3D45 Virtual Serial",
            "FIRMWARE_NAME:Dremel3D45 FIRMWARE_VERSION:v3.0_R02.12.10",
            "Cap:AUTOREPORT_TEMP:1",
            "Cap:AUTOREPORT_SD_STATUS:1",
            "ok",
        ]
    );
    assert!(session.status().await.connected);
    session.close().await;
}

#[tokio::test]
async fn test_missing_address_disables_session() {
    let client = MockClient::new();
    let session = Session::open(&Config::default(), client.clone()).await;
    assert_eq!(drain(&session).await, vec!["Error: No printer IP configured"]);
    assert!(session.is_open());
    assert!(!session.status().await.connected);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_unreachable_printer_reports_once() {
    let client = MockClient::unreachable();
    let session = Session::open(&test_config(), client.clone()).await;
    let lines = drain(&session).await;
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Error: Connection failed - Transport error: connection refused")
    );
    assert_eq!(lines.iter().filter(|l| l.starts_with("Error:")).count(), 1);
    // Still open, just not functional
    assert_eq!(send(&session, "M24").await, vec!["Error: Not connected", "ok"]);
}

#[tokio::test]
async fn test_numbered_lines_in_order_are_accepted() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    for n in 0..10 {
        assert_eq!(send(&session, &numbered(n, "G1 X1")).await, vec!["ok"]);
    }
}

#[tokio::test]
async fn test_corrupted_line_requests_resend_without_side_effects() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(send(&session, &numbered(0, "M110 N0")).await, vec!["ok"]);

    let corrupted = numbered(1, "M104 S200").replacen("S200", "S900", 1);
    assert_eq!(
        send(&session, &corrupted).await,
        vec!["Error:checksum mismatch", "Resend:1"]
    );
    assert!(client.commands().is_empty());

    // The same line sent intact is accepted
    assert_eq!(send(&session, &numbered(1, "M104 S200")).await, vec!["ok"]);
    assert_eq!(client.commands(), vec!["NOZZLEHEAT=200"]);
}

#[tokio::test]
async fn test_out_of_sequence_line_is_rejected() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(send(&session, &numbered(0, "M110 N0")).await, vec!["ok"]);
    assert_eq!(
        send(&session, &numbered(2, "M140 S60")).await,
        vec!["Error:Line Number is not Last Line Number+1", "Resend:1"]
    );
    assert!(client.commands().is_empty());
    assert_eq!(send(&session, &numbered(1, "M140 S60")).await, vec!["ok"]);
    assert_eq!(send(&session, &numbered(2, "M140 S60")).await, vec!["ok"]);
}

#[tokio::test]
async fn test_m110_resets_expected_line() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(send(&session, &numbered(0, "G28")).await, vec!["ok"]);
    assert_eq!(send(&session, "M110 N41").await, vec!["ok"]);
    assert_eq!(send(&session, &numbered(42, "G28")).await, vec!["ok"]);
    assert_eq!(
        send(&session, &numbered(7, "G28")).await,
        vec!["Error:Line Number is not Last Line Number+1", "Resend:43"]
    );
}

#[tokio::test]
async fn test_partial_and_batched_writes() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(session.write(b"G2").await, 2);
    assert!(drain(&session).await.is_empty());
    session.write(b"8\nM114\r\nG90\n").await;
    assert_eq!(
        drain(&session).await,
        vec!["ok", "X:0.00 Y:0.00 Z:0.00 E:0.00", "ok", "ok"]
    );
}

#[tokio::test]
async fn test_comments_cancel_and_unknown_codes_are_acknowledged() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(send(&session, "\u{18}").await, vec!["ok"]);
    assert_eq!(send(&session, "; just a comment").await, vec!["ok"]);
    assert_eq!(send(&session, "M9999 P1").await, vec!["ok"]);
    assert_eq!(send(&session, "m118 hello (inline) world ; tail").await, vec!["echo:hello  world", "ok"]);
}

#[tokio::test]
async fn test_cancel_byte_without_newline_is_acknowledged_at_once() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(session.write(b"\x18").await, 1);
    assert_eq!(drain(&session).await, vec!["ok"]);
    assert_eq!(
        send(&session, "M105").await,
        vec!["ok T:24.0 /0.0 B:22.5 /0.0 C:21.0 /0.0"]
    );
}

#[tokio::test]
async fn test_serial_surface() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    assert_eq!(session.port_name(), "DREMEL3D45");
    assert_eq!(session.baud_rate(), 115_200);

    session.write(b"M31\n").await;
    assert_eq!(session.in_waiting(), "echo:Print time: 00:00:00\n".len() + "ok\n".len());
    assert_eq!(session.read(5).await, b"echo:".to_vec());
    assert_eq!(session.read(100).await, b"Print time: 00:00:00\n".to_vec());
    assert_eq!(session.read(100).await, b"ok\n".to_vec());
    assert!(session.read(1).await.is_empty());

    session.write(b"M115\n").await;
    assert!(session.in_waiting() > 0);
    session.reset_input_buffer().await;
    assert_eq!(session.in_waiting(), 0);
    assert_eq!(session.read_line().await, "");
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let client = MockClient::new();
    let session = open_session(&client).await;
    session.write(b"M105\n").await;
    session.close().await;
    session.close().await;
    assert!(!session.is_open());
    assert_eq!(session.in_waiting(), 0);
    assert_eq!(session.write(b"M105\n").await, 0);
    assert_eq!(session.read_line().await, "");
}
