//! Shared test utilities for uart2ip integration tests.
//!
//! This module provides common test infrastructure including:
//! - A gateway running on a loopback port against a mock device
//! - A scripted device that acknowledges chunks and answers commands
//! - A one-shot TCP client

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use uart2ip::forward::CommandSink;
use uart2ip::port::{mock_pair, AckMode, MockDevice, ReceivedCommand};
use uart2ip::wire::ResultEnvelope;
use uart2ip::{
    CommandCode, CommandMessage, Config, Gateway, GatewayResult, IdWidth, ResultCode,
    ResultMessage, SharedBridge,
};

/// Configuration tuned for fast loopback tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.network_timeout_ms = 1500;
    config.server.wait_result_ms = 10;
    config.serial.timeout_ms = 20;
    config.serial.poll_interval_ms = 1;
    config
}

/// A gateway running in the background.
pub struct RunningBridge {
    pub addr: SocketAddr,
    pub state: SharedBridge,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<GatewayResult<()>>,
}

impl RunningBridge {
    /// Signal shutdown and wait for `run` to return.
    pub async fn stop(mut self) -> GatewayResult<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Wait for `run` to return on its own.
    pub async fn join(self) -> GatewayResult<()> {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("gateway did not stop")
            .expect("gateway task panicked")
    }
}

/// Start a gateway on a loopback port, returning it and the device end.
pub async fn start_bridge(config: Config) -> (RunningBridge, MockDevice) {
    start_bridge_with(config, None).await
}

pub async fn start_bridge_with(
    config: Config,
    sink: Option<Arc<dyn CommandSink>>,
) -> (RunningBridge, MockDevice) {
    let (port, device) = mock_pair("MOCK0");
    let mut gateway = Gateway::bind(&config, Box::new(port))
        .await
        .expect("gateway should bind");
    if let Some(sink) = sink {
        gateway = gateway.with_sink(sink);
    }

    let addr = gateway.local_addr().unwrap();
    let state = gateway.state().clone();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(gateway.run(async move {
        let _ = stop_rx.await;
    }));

    (
        RunningBridge {
            addr,
            state,
            stop: Some(stop_tx),
            handle,
        },
        device,
    )
}

/// Send one command and collect everything the gateway writes back.
pub async fn request(addr: SocketAddr, command: &CommandMessage) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(&command.pack()).await.expect("send command");

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .expect("read response");
    response
}

/// A command with a correlation id in its first payload bytes.
pub fn command_with_id(code: CommandCode, id: u16, body_len: usize) -> CommandMessage {
    let mut payload = id.to_be_bytes().to_vec();
    payload.extend((0..body_len).map(|i| (i % 251) as u8));
    CommandMessage::new(code, payload).unwrap()
}

/// The result the scripted device returns for `command`.
pub fn echo_result(command: &CommandMessage) -> ResultMessage {
    let tail: Vec<u8> = command.payload().iter().rev().take(8).copied().collect();
    ResultMessage::new(ResultCode::Ok, tail).unwrap()
}

/// What the scripted device saw for one command.
#[derive(Debug)]
pub struct Observed {
    pub command: CommandMessage,
    pub received: ReceivedCommand,
    /// Another envelope started while this one's result was outstanding.
    pub overlapped: bool,
}

/// How the scripted device behaves.
#[derive(Debug, Clone, Copy)]
pub struct DeviceScript {
    pub ack: AckMode,
    /// Pause before answering a command that expects a result.
    pub answer_delay: Duration,
    pub answer: bool,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            ack: AckMode::EachChunk,
            answer_delay: Duration::ZERO,
            answer: true,
        }
    }
}

/// Run a device that acks every chunk and answers with [`echo_result`].
pub fn spawn_device(device: MockDevice, script: DeviceScript) -> mpsc::UnboundedReceiver<Observed> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_device(device, script, tx));
    rx
}

async fn run_device(
    mut device: MockDevice,
    script: DeviceScript,
    observed: mpsc::UnboundedSender<Observed>,
) {
    let width = IdWidth::default();
    let mut consumed = 0usize;

    while let Some(received) = device.accept_command(script.ack).await {
        consumed += 1 + received.chunks.len();

        let envelope = received.envelope();
        let mut body: &[u8] = &envelope[1..];
        let command = CommandMessage::read(&mut body)
            .await
            .expect("device received a malformed command");

        let mut overlapped = false;
        if script.answer && command.has_response() {
            tokio::time::sleep(script.answer_delay).await;
            overlapped = device.write_log().len() != consumed;

            let id = command.correlation_id(width).unwrap();
            let frame = ResultEnvelope::new(id, echo_result(&command)).pack(width);
            if device.send(&frame).await.is_err() {
                return;
            }
        }

        let _ = observed.send(Observed {
            command,
            received,
            overlapped,
        });
    }
}
