//! End-to-end tests for the Modbus TCP slave.
//!
//! Each test starts a slave on an ephemeral port and talks to it over a
//! real socket, asserting byte-exact frames.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use zmodsim::{BankSizes, ModbusSlave, ModbusTcpSlave, SlaveConfig};

fn test_config() -> SlaveConfig {
    let mut config = SlaveConfig::default();
    config.port = 0; // ephemeral bind
    config.unit_id = 1;
    config.bank_sizes = BankSizes {
        coils: 100,
        discrete: 100,
        holding: 100,
        input: 100,
    };
    config
}

async fn start_slave(config: SlaveConfig) -> (ModbusTcpSlave, SocketAddr) {
    let mut slave = ModbusTcpSlave::new(config);
    slave.start().await.expect("slave start");
    let addr = slave.local_addr().expect("bound address");
    (slave, addr)
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect")
}

/// Send one request and read exactly `response_len` reply bytes
async fn exchange(stream: &mut TcpStream, request: &[u8], response_len: usize) -> Vec<u8> {
    stream.write_all(request).await.expect("send");

    let mut response = vec![0u8; response_len];
    timeout(Duration::from_secs(1), stream.read_exact(&mut response))
        .await
        .expect("response timeout")
        .expect("read response");
    response
}

#[tokio::test]
async fn test_read_holding_all_zero() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let request = [
        0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x0A,
    ];
    let response = exchange(&mut stream, &request, 29).await;

    let mut expected = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x17, 0x01, 0x03, 0x14];
    expected.extend_from_slice(&[0u8; 20]);
    assert_eq!(response, expected);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_write_then_read_single_holding() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let write = [
        0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x05, 0x01, 0x23,
    ];
    let response = exchange(&mut stream, &write, 12).await;
    assert_eq!(response, write);

    let read = [
        0x00, 0x03, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x05, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &read, 11).await;
    assert_eq!(
        response,
        vec![0x00, 0x03, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x01, 0x23]
    );

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_illegal_data_address_exception() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    // start=95, qty=10 crosses the 100-register bank
    let request = [
        0x00, 0x04, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x5F, 0x00, 0x0A,
    ];
    let response = exchange(&mut stream, &request, 9).await;
    assert_eq!(
        response,
        vec![0x00, 0x04, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]
    );

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_illegal_data_value_exception() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    // qty=200 exceeds the read limit of 125 words
    let request = [
        0x00, 0x05, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0xC8,
    ];
    let response = exchange(&mut stream, &request, 9).await;
    assert_eq!(
        response,
        vec![0x00, 0x05, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x03]
    );

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_write_single_coil_roundtrip() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let set = [
        0x00, 0x06, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0xFF, 0x00,
    ];
    let response = exchange(&mut stream, &set, 12).await;
    assert_eq!(response, set);

    let read = [
        0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &read, 10).await;
    assert_eq!(
        response,
        vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01]
    );

    let clear = [
        0x00, 0x08, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0x00, 0x00,
    ];
    let response = exchange(&mut stream, &clear, 12).await;
    assert_eq!(response, clear);

    let read = [
        0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &read, 10).await;
    assert_eq!(response[9], 0x00);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_wrong_unit_id_silently_dropped() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    // Unit 2 against a slave configured for unit 1: no reply, socket
    // stays open. The follow-up request proves both.
    let foreign = [
        0x00, 0x0A, 0x00, 0x00, 0x00, 0x06, 0x02, 0x03, 0x00, 0x00, 0x00, 0x01,
    ];
    stream.write_all(&foreign).await.expect("send");

    let valid = [
        0x00, 0x0B, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &valid, 11).await;
    // The first reply on the wire answers the second request
    assert_eq!(&response[0..2], &[0x00, 0x0B]);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_unit_answered() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let request = [
        0x00, 0x0C, 0x00, 0x00, 0x00, 0x06, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &request, 11).await;
    assert_eq!(&response[0..2], &[0x00, 0x0C]);
    assert_eq!(response[6], 0x00);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_function_code() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let request = [
        0x00, 0x0D, 0x00, 0x00, 0x00, 0x06, 0x01, 0x2B, 0x00, 0x00, 0x00, 0x01,
    ];
    let response = exchange(&mut stream, &request, 9).await;
    assert_eq!(response[7], 0xAB);
    assert_eq!(response[8], 0x01);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_request_split_across_segments() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    let request = [
        0x00, 0x0E, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01,
    ];
    stream.write_all(&request[..5]).await.expect("send head");
    sleep(Duration::from_millis(20)).await;
    stream.write_all(&request[5..]).await.expect("send tail");

    let mut response = vec![0u8; 11];
    timeout(Duration::from_secs(1), stream.read_exact(&mut response))
        .await
        .expect("response timeout")
        .expect("read");
    assert_eq!(&response[0..2], &[0x00, 0x0E]);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_pipelined_requests_answered_in_order() {
    let (mut slave, addr) = start_slave(test_config()).await;
    let mut stream = connect(addr).await;

    // Two requests in one TCP segment
    let mut batch = Vec::new();
    batch.extend_from_slice(&[
        0x00, 0x10, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01,
    ]);
    batch.extend_from_slice(&[
        0x00, 0x11, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x01, 0x00, 0x01,
    ]);
    stream.write_all(&batch).await.expect("send batch");

    let mut responses = vec![0u8; 22];
    timeout(Duration::from_secs(1), stream.read_exact(&mut responses))
        .await
        .expect("response timeout")
        .expect("read");

    assert_eq!(&responses[0..2], &[0x00, 0x10]);
    assert_eq!(&responses[11..13], &[0x00, 0x11]);

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_auto_increment_wraps_through_sequence() {
    let mut config = test_config();
    config.holding_auto.enabled = true;
    config.holding_auto.addresses = vec![0];
    config.holding_auto.interval_ms = 10;
    config.holding_auto.increment = 5;
    config.holding_auto.max = 12;

    let (mut slave, addr) = start_slave(config).await;
    let mut stream = connect(addr).await;

    // Values cycle 0 -> 5 -> 10 -> 0; every observation must come from
    // that cycle and the worker must be seen mutating.
    let mut saw_nonzero = false;
    for tid in 0..100u16 {
        let mut request = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        request[0..2].copy_from_slice(&tid.to_be_bytes());
        let response = exchange(&mut stream, &request, 11).await;

        let value = u16::from_be_bytes([response[9], response[10]]);
        assert!(
            value == 0 || value == 5 || value == 10,
            "value {} outside the wrap cycle",
            value
        );
        if value != 0 {
            saw_nonzero = true;
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_nonzero, "worker never incremented the register");

    slave.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_joins_and_closes_clients() {
    let mut config = test_config();
    config.holding_auto.enabled = true;
    config.holding_auto.addresses = vec![0];
    config.holding_auto.interval_ms = 10;

    let (mut slave, addr) = start_slave(config).await;
    let mut stream = connect(addr).await;
    assert!(slave.is_running());

    timeout(Duration::from_secs(2), slave.stop())
        .await
        .expect("stop timed out")
        .expect("stop failed");
    assert!(!slave.is_running());

    // The handler side is gone; the read drains to EOF.
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await
        .expect("EOF timeout")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (mut slave, _) = start_slave(test_config()).await;

    slave.stop().await.unwrap();
    slave.stop().await.unwrap();
    assert!(!slave.is_running());
}
