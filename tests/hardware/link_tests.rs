//! Link lifecycle on a real device.

use super::utils::*;
use gcs_serial_link::{LinkError, LinkEvent, SerialConfiguration};
use std::time::{Duration, Instant};

#[test]
#[ignore]
fn test_real_link_connect_disconnect() {
    let Some(port) = skip_without_hardware() else {
        return;
    };
    print_available_ports();

    let manager = hardware_manager();
    let link = manager.create_link(port.configuration("hw")).unwrap();
    manager.connect_link("hw").unwrap();
    assert!(link.is_connected());
    println!(
        "{} connected, bootloader: {}",
        port.port_name,
        link.is_bootloader()
    );

    let started = Instant::now();
    manager.disconnect_link("hw").unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!link.is_connected());
}

#[test]
#[ignore]
fn test_real_link_loopback() {
    let Some(port) = skip_without_hardware() else {
        return;
    };
    if !port.loopback_enabled {
        println!("Skipping loopback test: TEST_LOOPBACK not set");
        return;
    }

    let manager = hardware_manager();
    let link = manager.create_link(port.configuration("loop")).unwrap();
    let rx = link.subscribe();
    manager.connect_link("loop").unwrap();

    link.write_bytes(b"PING").unwrap();
    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while received.len() < 4 && Instant::now() < deadline {
        if let Ok(LinkEvent::Bytes(bytes)) = rx.recv_timeout(Duration::from_millis(200)) {
            received.extend_from_slice(&bytes);
        }
    }
    assert_eq!(received, b"PING");
}

#[test]
#[ignore]
fn test_missing_real_port_is_unavailable() {
    let manager = hardware_manager();
    let config = SerialConfiguration::for_port("ghost", "/dev/ttyDOESNOTEXIST", 57600).unwrap();
    manager.create_link(config).unwrap();

    let err = manager.connect_link("ghost").unwrap_err();
    assert!(matches!(err, LinkError::DeviceUnavailable { .. }));
}
