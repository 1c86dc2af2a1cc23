//! Integration tests for the bridge lifecycle
//!
//! These tests run a real worker thread against a scripted device:
//! - Framing of the first complete line after attaching
//! - Reconnection after failed opens and unplugs
//! - Stop handling and device close
//! - Latest-only delivery to the consumer

mod common;

use common::builders::BridgeBuilder;
use common::wait_until;
use linebridge::{BridgeEvent, BridgeState, DeviceLink, StopToken};
use std::time::{Duration, Instant};

#[test]
fn test_publishes_first_complete_line() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();

    device.feed(b"junk\r\n12.5 3.2\r\n");
    wait_until("a record", || bridge.peek_latest().is_some());

    let record = bridge.latest().unwrap();
    assert_eq!(record.text, "12.5 3.2");
    assert_eq!(record.sequence, 1);
    assert_eq!(record.values().unwrap(), vec![12.5, 3.2]);
    assert!(bridge.latest().is_none(), "latest() consumes the record");

    bridge.stop().unwrap();
}

#[test]
fn test_corrupt_byte_dropped_from_record() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();

    device.feed(b"\xFE\n1.0\xFF2.0\r\n");
    wait_until("a record", || bridge.peek_latest().is_some());

    assert_eq!(bridge.latest().unwrap().text, "1.02.0");
    assert_eq!(bridge.state(), BridgeState::Connected);
    assert_eq!(bridge.stats().bytes_dropped, 2);

    bridge.stop().unwrap();
}

#[test]
fn test_connects_after_three_failed_opens() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    let events = bridge.events();
    device.fail_next_opens(3, "No such file or directory");

    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    assert_eq!(device.open_attempts(), 4);
    let stats = bridge.stats();
    assert_eq!(stats.connect_attempts, 4);
    assert_eq!(stats.connect_failures, 3);

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received
            .iter()
            .filter(|e| matches!(e, BridgeEvent::ConnectionFailed(_)))
            .count(),
        3
    );
    assert!(received.contains(&BridgeEvent::StateChanged(BridgeState::Connected)));

    bridge.stop().unwrap();
}

#[test]
fn test_stop_while_connected_closes_once() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    // Leave the worker mid-frame
    device.feed(b"\n12.5 3");
    wait_until("bytes consumed", || device.pending_input() == 0);

    bridge.request_stop();
    bridge.join().unwrap();

    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(!device.is_device_open());
    assert_eq!(device.closes(), 1);
    assert_eq!(device.close_calls(), 1);
    assert!(bridge.latest().is_none());

    // Closing again changes nothing
    device.clone().close();
    assert_eq!(device.closes(), 1);
}

#[test]
fn test_stop_is_prompt_on_silent_device() {
    let (mut bridge, device) = BridgeBuilder::new().read_timeout_ms(20).build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);
    device.feed(b"\nno terminator coming");

    let start = Instant::now();
    bridge.stop().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(bridge.state(), BridgeState::Stopped);
}

#[test]
fn test_stop_interrupts_backoff() {
    let (mut bridge, device) = BridgeBuilder::new().retry_ms(10_000, 10_000).build();
    device.fail_next_opens(100, "Permission denied");
    bridge.start().unwrap();
    wait_until("first failure", || bridge.stats().connect_failures >= 1);

    let start = Instant::now();
    bridge.stop().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert_eq!(device.closes(), 0);
    assert_eq!(device.close_calls(), 1);
}

#[test]
fn test_last_write_wins() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    for i in 1..=5u64 {
        device.feed(format!("partial\nrecord {}\n", i).as_bytes());
        wait_until("publish", || bridge.stats().records_published == i);
    }

    let record = bridge.latest().unwrap();
    assert_eq!(record.text, "record 5");
    assert_eq!(record.sequence, 5);
    assert!(bridge.latest().is_none());

    bridge.stop().unwrap();
}

#[test]
fn test_backlog_flushed_after_publish() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    device.feed(b"x\nfresh\nstale 1\nstale 2\nstale 3\n");
    wait_until("a record", || bridge.stats().records_published == 1);
    wait_until("flush", || bridge.stats().flushes == 1);

    assert_eq!(bridge.latest().unwrap().text, "fresh");
    assert!(device.flushed_bytes() > 0);
    assert_eq!(device.pending_input(), 0);

    bridge.stop().unwrap();
}

#[test]
fn test_reconnects_after_unplug() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    device.fail_next_opens(2, "Device or resource busy");
    device.unplug();
    wait_until("disconnect", || bridge.stats().disconnects == 1);
    wait_until("reconnection", || bridge.state() == BridgeState::Connected);
    assert_eq!(device.open_attempts(), 4);

    device.feed(b"x\nback again\n");
    wait_until("a record", || bridge.peek_latest().is_some());
    assert_eq!(bridge.latest().unwrap().text, "back again");

    bridge.stop().unwrap();
}

#[test]
fn test_overlong_lines_do_not_block_later_records() {
    let (mut bridge, device) = BridgeBuilder::new().max_line_length(8).build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    device.feed(b"\nthis line is far too long\nshort\n");
    wait_until("a record", || bridge.peek_latest().is_some());

    assert_eq!(bridge.latest().unwrap().text, "short");
    assert_eq!(bridge.stats().lines_discarded, 1);

    bridge.stop().unwrap();
}

#[test]
fn test_external_token_and_drop() {
    let token = StopToken::new();
    let (mut bridge, device) = BridgeBuilder::new().token(token.clone()).build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);
    assert!(bridge.is_running());

    token.cancel();
    wait_until("worker exit", || !bridge.is_running());
    assert_eq!(bridge.state(), BridgeState::Stopped);

    drop(bridge);
    assert_eq!(device.closes(), 1);
}

#[test]
fn test_drop_stops_running_bridge() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    drop(bridge);
    assert!(!device.is_device_open());
    assert_eq!(device.close_calls(), 1);
}

#[test]
fn test_record_events_reported() {
    let (mut bridge, device) = BridgeBuilder::new().build();
    let events = bridge.events();
    bridge.start().unwrap();
    wait_until("connection", || bridge.state() == BridgeState::Connected);

    device.feed(b"\n1 2\n");
    wait_until("a record", || bridge.peek_latest().is_some());
    bridge.stop().unwrap();

    let received: Vec<_> = events.try_iter().collect();
    assert!(received.contains(&BridgeEvent::RecordPublished { sequence: 1 }));
    assert_eq!(
        received.last(),
        Some(&BridgeEvent::StateChanged(BridgeState::Stopped))
    );
}
