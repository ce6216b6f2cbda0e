//! Integration tests for LineCodec with Tokio streams.
//!
//! One end of a duplex pipe plays the controller firmware writing raw bytes;
//! the other end is the backend reading framed `DeviceLine`s and sending
//! `DeviceCommand`s.

use futures::{SinkExt, StreamExt};
use gatekeep_core::TagId;
use gatekeep_protocol::{DeviceCommand, DeviceEvent, DeviceLine, LineCodec, encode_event};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::codec::Framed;

/// Helper function to create a controller/backend pair over a duplex stream.
fn create_link(buffer_size: usize) -> (DuplexStream, Framed<DuplexStream, LineCodec>) {
    let (controller, backend) = tokio::io::duplex(buffer_size);
    (controller, Framed::new(backend, LineCodec::new()))
}

fn tag(s: &str) -> TagId {
    TagId::new(s).unwrap()
}

#[tokio::test]
async fn test_controller_boot_sequence() {
    let (mut controller, mut backend) = create_link(1024);

    controller
        .write_all(b"Initializing RFID reader...\r\nBACKEND_DATA:{\"event\":\"SYSTEM_READY\"}\r\n")
        .await
        .unwrap();

    assert_eq!(
        backend.next().await.unwrap().unwrap(),
        DeviceLine::Diagnostic("Initializing RFID reader...".to_string())
    );
    assert_eq!(
        backend.next().await.unwrap().unwrap(),
        DeviceLine::Event(DeviceEvent::SystemReady)
    );
}

#[tokio::test]
async fn test_scan_arrives_in_fragments() {
    let (mut controller, mut backend) = create_link(1024);

    let line = format!(
        "{}\n",
        encode_event(&DeviceEvent::CardScanned {
            tag: tag("D0D39925")
        })
    );
    let (head, tail) = line.as_bytes().split_at(10);

    controller.write_all(head).await.unwrap();
    controller.flush().await.unwrap();
    tokio::task::yield_now().await;
    controller.write_all(tail).await.unwrap();

    assert_eq!(
        backend.next().await.unwrap().unwrap(),
        DeviceLine::Event(DeviceEvent::CardScanned {
            tag: tag("D0D39925")
        })
    );
}

#[tokio::test]
async fn test_malformed_line_does_not_break_stream() {
    let (mut controller, mut backend) = create_link(1024);

    controller
        .write_all(b"BACKEND_DATA:{\"event\":\nBACKEND_DATA:{\"event\":\"GATE_CLOSED\"}\n")
        .await
        .unwrap();

    let first = backend.next().await.unwrap().unwrap();
    assert!(matches!(
        first,
        DeviceLine::Event(DeviceEvent::Unknown { ref raw }) if raw == "BACKEND_DATA:{\"event\":"
    ));
    assert_eq!(
        backend.next().await.unwrap().unwrap(),
        DeviceLine::Event(DeviceEvent::GateClosed)
    );
}

#[tokio::test]
async fn test_commands_reach_controller_as_lines() {
    let (controller, mut backend) = create_link(1024);
    let mut controller = BufReader::new(controller);

    backend
        .send(DeviceCommand::AccessGranted {
            tag: tag("D0D39925"),
            auto_lock_seconds: 5,
        })
        .await
        .unwrap();
    backend
        .send(DeviceCommand::AccessDenied {
            tag: tag("00000000"),
        })
        .await
        .unwrap();
    backend.send(DeviceCommand::OpenGate).await.unwrap();
    backend.send(DeviceCommand::CloseGate).await.unwrap();

    let mut lines = Vec::new();
    for _ in 0..4 {
        let mut line = String::new();
        controller.read_line(&mut line).await.unwrap();
        lines.push(line);
    }

    assert_eq!(
        lines,
        vec![
            "ACCESS_GRANTED:D0D39925:5\n",
            "ACCESS_DENIED:00000000\n",
            "OPEN_GATE\n",
            "CLOSE_GATE\n",
        ]
    );
}

#[tokio::test]
async fn test_stream_ends_with_trailing_line_on_close() {
    let (mut controller, mut backend) = create_link(1024);

    controller
        .write_all(b"BACKEND_DATA:{\"event\":\"GATE_OPEN\"}")
        .await
        .unwrap();
    drop(controller);

    assert_eq!(
        backend.next().await.unwrap().unwrap(),
        DeviceLine::Event(DeviceEvent::GateOpened)
    );
    assert!(backend.next().await.is_none());
}

#[tokio::test]
async fn test_many_scans_in_sequence() {
    let (mut controller, mut backend) = create_link(8192);

    let tags: Vec<TagId> = (0..20).map(|i| tag(&format!("CAFE{i:04}"))).collect();
    let mut burst = String::new();
    for t in &tags {
        burst.push_str(&encode_event(&DeviceEvent::CardScanned { tag: t.clone() }));
        burst.push('\n');
    }
    controller.write_all(burst.as_bytes()).await.unwrap();

    for t in &tags {
        let line = backend.next().await.unwrap().unwrap();
        assert_eq!(
            line,
            DeviceLine::Event(DeviceEvent::CardScanned { tag: t.clone() })
        );
    }
}
