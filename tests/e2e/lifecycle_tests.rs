//! Startup, shutdown and background duties of a running gateway.

use crate::common::*;
use pretty_assertions::assert_eq;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use uart2ip::port::{mock_pair, AckMode};
use uart2ip::wire::ResultEnvelope;
use uart2ip::{
    CommandCode, CommandMessage, CorrelationId, ForwardedCommand, Gateway, GatewayError, IdWidth,
    ResultCode, ResultMessage,
};

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn stop_cancels_an_in_flight_session() {
    let mut config = test_config();
    config.server.network_timeout_ms = 5000;
    let (bridge, device) = start_bridge(config).await;
    let mut observed = spawn_device(
        device,
        DeviceScript {
            answer: false,
            ..DeviceScript::default()
        },
    );

    let command = command_with_id(CommandCode::CallEntrypoint, 0x0C0C, 12);
    let client = {
        let addr = bridge.addr;
        let command = command.clone();
        tokio::spawn(async move { request(addr, &command).await })
    };
    assert_eq!(observed.recv().await.unwrap().command, command);

    bridge.stop().await.unwrap();
    let response = tokio::time::timeout(Duration::from_secs(2), client)
        .await
        .expect("client was not released")
        .unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn device_command_is_forwarded_to_its_destination() {
    let destination = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = destination.local_addr().unwrap().port();

    let (bridge, mut device) = start_bridge(test_config()).await;
    let command = CommandMessage::new(CommandCode::RemoteOutput, b"hello host".to_vec()).unwrap();
    let forwarded = ForwardedCommand::new(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port), command.clone());

    let mut frame = vec![0x01];
    frame.extend_from_slice(&forwarded.pack());
    device.send(&frame).await.unwrap();

    let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), destination.accept())
        .await
        .expect("nothing was forwarded")
        .unwrap();
    let mut delivered = Vec::new();
    stream.read_to_end(&mut delivered).await.unwrap();
    assert_eq!(delivered, command.pack());

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn unclaimed_result_is_evicted() {
    let mut config = test_config();
    config.bridge.result_ttl_ms = 100;
    config.bridge.eviction_interval_ms = 20;
    let (bridge, mut device) = start_bridge(config).await;

    let id = CorrelationId::new(77);
    let result = ResultMessage::new(ResultCode::GenericError, vec![1, 2, 3]).unwrap();
    device
        .send(&ResultEnvelope::new(id, result).pack(IdWidth::default()))
        .await
        .unwrap();

    let pending = bridge.state.pending();
    eventually("the result to be filed", || pending.contains(id)).await;
    eventually("the result to be evicted", || !pending.contains(id)).await;
    assert_eq!(pending.stats().evicted(), 1);
    assert_eq!(pending.stats().claimed(), 0);

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn late_result_does_not_answer_the_next_client() {
    let mut config = test_config();
    config.server.network_timeout_ms = 300;
    let (bridge, mut device) = start_bridge(config).await;
    let width = IdWidth::default();

    let first = command_with_id(CommandCode::CallEntrypoint, 1, 6);
    let client = {
        let addr = bridge.addr;
        let first = first.clone();
        tokio::spawn(async move { request(addr, &first).await })
    };
    device.accept_command(AckMode::EachChunk).await.unwrap();
    assert!(client.await.unwrap().is_empty());

    // The answer to the abandoned command arrives after its client left.
    let first_id = first.correlation_id(width).unwrap();
    device
        .send(&ResultEnvelope::new(first_id, echo_result(&first)).pack(width))
        .await
        .unwrap();
    let pending = bridge.state.pending();
    eventually("the late result to be filed", || pending.contains(first_id)).await;

    let second = command_with_id(CommandCode::CallEntrypoint, 2, 6);
    let client = {
        let addr = bridge.addr;
        let second = second.clone();
        tokio::spawn(async move { request(addr, &second).await })
    };
    device.accept_command(AckMode::EachChunk).await.unwrap();
    let second_id = second.correlation_id(width).unwrap();
    device
        .send(&ResultEnvelope::new(second_id, echo_result(&second)).pack(width))
        .await
        .unwrap();

    assert_eq!(client.await.unwrap(), echo_result(&second).pack());
    assert!(pending.contains(first_id));

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn reused_id_is_answered_by_its_own_result() {
    let mut config = test_config();
    config.server.network_timeout_ms = 300;
    let (bridge, mut device) = start_bridge(config).await;
    let width = IdWidth::default();

    let command = command_with_id(CommandCode::CallEntrypoint, 0x11, 6);
    let id = command.correlation_id(width).unwrap();

    let client = {
        let addr = bridge.addr;
        let command = command.clone();
        tokio::spawn(async move { request(addr, &command).await })
    };
    device.accept_command(AckMode::EachChunk).await.unwrap();
    assert!(client.await.unwrap().is_empty());

    let stale = ResultMessage::new(ResultCode::Ok, b"stale".to_vec()).unwrap();
    device
        .send(&ResultEnvelope::new(id, stale).pack(width))
        .await
        .unwrap();
    let pending = bridge.state.pending();
    eventually("the stale result to be filed", || pending.contains(id)).await;

    // Same id again, as a client calling the same entrypoint would send.
    let client = {
        let addr = bridge.addr;
        let command = command.clone();
        tokio::spawn(async move { request(addr, &command).await })
    };
    device.accept_command(AckMode::EachChunk).await.unwrap();
    let fresh = ResultMessage::new(ResultCode::Ok, b"fresh".to_vec()).unwrap();
    device
        .send(&ResultEnvelope::new(id, fresh.clone()).pack(width))
        .await
        .unwrap();

    assert_eq!(client.await.unwrap(), fresh.pack());
    assert!(pending.is_empty());
    assert_eq!(pending.stats().duplicates(), 0);

    bridge.stop().await.unwrap();
}

#[tokio::test]
async fn bind_reports_a_busy_address() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config();
    config.server.port = taken.local_addr().unwrap().port();

    let (port, _device) = mock_pair("MOCK1");
    match Gateway::bind(&config, Box::new(port)).await {
        Err(GatewayError::Bind { addr, .. }) => {
            assert_eq!(addr, format!("127.0.0.1:{}", config.server.port));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind on a busy port succeeded"),
    }
}
