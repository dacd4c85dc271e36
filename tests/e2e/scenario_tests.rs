//! Client-visible behavior of single transactions.

use crate::common::*;
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};
use uart2ip::port::AckMode;
use uart2ip::wire::FrameError;
use uart2ip::{CommandCode, CommandMessage, GatewayError};

fn framed(command: &CommandMessage) -> Vec<u8> {
    let mut bytes = vec![0x01];
    bytes.extend_from_slice(&command.pack());
    bytes
}

#[tokio::test]
async fn command_without_response_is_sent_in_one_chunk() {
    let (bridge, device) = start_bridge(test_config()).await;
    let mut observed = spawn_device(device, DeviceScript::default());

    let command = CommandMessage::new(CommandCode::Output, vec![0x42; 10]).unwrap();
    let response = request(bridge.addr, &command).await;
    assert!(response.is_empty());

    let seen = observed.recv().await.unwrap();
    assert_eq!(seen.received.prefix, framed(&command)[..5].to_vec());
    assert_eq!(seen.received.chunks, vec![vec![0x42; 10]]);
    assert_eq!(seen.command, command);

    let pending = bridge.state.pending();
    assert!(pending.is_empty());
    assert_eq!(pending.stats().filed(), 0);

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn large_command_is_chunked_and_answered() {
    let (bridge, device) = start_bridge(test_config()).await;
    let mut observed = spawn_device(device, DeviceScript::default());

    let command = command_with_id(CommandCode::CallEntrypoint, 0x0B0B, 198);
    assert_eq!(command.payload().len(), 200);

    let response = request(bridge.addr, &command).await;
    assert_eq!(response, echo_result(&command).pack());

    let seen = observed.recv().await.unwrap();
    let sizes: Vec<usize> = seen.received.chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![64, 64, 64, 8]);
    assert_eq!(seen.received.envelope(), framed(&command));

    let pending = bridge.state.pending();
    assert!(pending.is_empty());
    assert_eq!(pending.stats().claimed(), 1);

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn unacknowledged_chunk_times_out_and_frees_the_bridge() {
    let mut config = test_config();
    config.server.network_timeout_ms = 300;
    let (bridge, mut device) = start_bridge(config).await;

    // The device takes the prefix and the first chunk, then goes silent.
    let command = command_with_id(CommandCode::Load, 1, 98);
    let started = Instant::now();
    let client = {
        let addr = bridge.addr;
        let command = command.clone();
        tokio::spawn(async move { request(addr, &command).await })
    };
    assert_eq!(device.next_write().await.unwrap().len(), 5);
    assert_eq!(device.next_write().await.unwrap().len(), 64);

    let response = client.await.unwrap();
    assert!(response.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!bridge.state.bridge_busy());

    // A well-behaved device is served normally afterwards.
    let mut observed = spawn_device(device, DeviceScript::default());
    let next = command_with_id(CommandCode::CallEntrypoint, 2, 4);
    let response = request(bridge.addr, &next).await;
    assert_eq!(response, echo_result(&next).pack());
    assert_eq!(observed.recv().await.unwrap().command, next);

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn missing_result_ends_session_without_data() {
    let mut config = test_config();
    config.server.network_timeout_ms = 300;
    let (bridge, device) = start_bridge(config).await;
    let _observed = spawn_device(
        device,
        DeviceScript {
            answer: false,
            ..DeviceScript::default()
        },
    );

    let started = Instant::now();
    let command = command_with_id(CommandCode::Reset, 9, 0);
    let response = request(bridge.addr, &command).await;

    assert!(response.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!bridge.state.bridge_busy());

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_header_shuts_the_gateway_down() {
    let (bridge, mut device) = start_bridge(test_config()).await;

    let command = command_with_id(CommandCode::CallEntrypoint, 7, 4);
    let client = {
        let addr = bridge.addr;
        let command = command.clone();
        tokio::spawn(async move { request(addr, &command).await })
    };

    let received = device.accept_command(AckMode::EachChunk).await.unwrap();
    assert_eq!(received.envelope(), framed(&command));
    device.send(&[0xFF]).await.unwrap();

    // The waiting client is cancelled and sees a closed connection.
    assert!(client.await.unwrap().is_empty());

    let err = bridge.join().await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::LinkDesynchronized(FrameError::UnknownHeader(0xFF))
    ));
}

#[tokio::test]
async fn malformed_client_input_only_ends_that_session() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let (bridge, device) = start_bridge(test_config()).await;
    let _observed = spawn_device(device, DeviceScript::default());

    let mut bad = TcpStream::connect(bridge.addr).await.unwrap();
    bad.write_all(&[0x7F, 0x7F]).await.unwrap();
    let mut rest = Vec::new();
    bad.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let good = command_with_id(CommandCode::CallEntrypoint, 3, 1);
    assert_eq!(request(bridge.addr, &good).await, echo_result(&good).pack());

    bridge.stop().await.unwrap();
}
