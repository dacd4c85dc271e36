//! Concurrent clients share the link one transaction at a time.

use crate::common::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinSet;
use uart2ip::{CommandCode, CommandMessage, IdWidth};

const CLIENTS: u16 = 8;

fn framed(command: &CommandMessage) -> Vec<u8> {
    let mut bytes = vec![0x01];
    bytes.extend_from_slice(&command.pack());
    bytes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn responding_transactions_never_overlap() {
    let mut config = test_config();
    config.server.network_timeout_ms = 5000;
    config.bridge.chunk_size = 16;
    let (bridge, device) = start_bridge(config).await;
    let mut observed = spawn_device(
        device,
        DeviceScript {
            answer_delay: Duration::from_millis(15),
            ..DeviceScript::default()
        },
    );

    let mut clients = JoinSet::new();
    for i in 0..CLIENTS {
        let addr = bridge.addr;
        clients.spawn(async move {
            let command =
                command_with_id(CommandCode::CallEntrypoint, 0x100 + i, 40 + usize::from(i) * 3);
            let response = request(addr, &command).await;
            (command, response)
        });
    }

    let mut sent = BTreeSet::new();
    while let Some(joined) = clients.join_next().await {
        let (command, response) = joined.unwrap();
        assert_eq!(response, echo_result(&command).pack());
        sent.insert(command.correlation_id(IdWidth::default()).unwrap());
    }

    let mut seen = BTreeSet::new();
    for _ in 0..CLIENTS {
        let observation = observed.recv().await.unwrap();
        assert!(
            !observation.overlapped,
            "a command reached the device while another result was outstanding"
        );
        assert_eq!(observation.received.envelope(), framed(&observation.command));
        assert!(observation.received.chunks.iter().all(|c| c.len() <= 16));
        seen.insert(observation.command.correlation_id(IdWidth::default()).unwrap());
    }

    assert_eq!(seen, sent);
    assert!(bridge.state.pending().is_empty());
    bridge.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_traffic_keeps_envelopes_whole() {
    let mut config = test_config();
    config.bridge.chunk_size = 8;
    let (bridge, device) = start_bridge(config).await;
    let mut observed = spawn_device(device, DeviceScript::default());

    let mut clients = JoinSet::new();
    for i in 0..CLIENTS {
        let addr = bridge.addr;
        clients.spawn(async move {
            let command = if i % 2 == 0 {
                CommandMessage::new(CommandCode::Output, vec![i as u8; 30 + usize::from(i)]).unwrap()
            } else {
                command_with_id(CommandCode::RegisterEntrypoint, i, 25)
            };
            let response = request(addr, &command).await;
            (command, response)
        });
    }

    let mut sent = Vec::new();
    while let Some(joined) = clients.join_next().await {
        let (command, response) = joined.unwrap();
        if command.has_response() {
            assert_eq!(response, echo_result(&command).pack());
        } else {
            assert!(response.is_empty());
        }
        sent.push(framed(&command));
    }

    let mut received = Vec::new();
    for _ in 0..CLIENTS {
        let observation = observed.recv().await.unwrap();
        assert_eq!(observation.received.envelope(), framed(&observation.command));
        received.push(observation.received.envelope());
    }

    sent.sort();
    received.sort();
    assert_eq!(received, sent);
    bridge.stop().await.unwrap();
}
