//! Delivery of device-originated commands to other network nodes.
//!
//! The device can act as a command source: it sends a `Command` frame that
//! names a destination address. The reader queues these and the forwarder
//! delivers them here, off the serial path. Nothing about delivery feeds back
//! into the bridge.

use crate::message::ForwardedCommand;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where forwarded commands go.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn deliver(&self, command: &ForwardedCommand) -> io::Result<()>;
}

/// Opens one TCP connection per command, writes it and closes.
#[derive(Debug, Clone)]
pub struct TcpCommandSink {
    connect_timeout: Duration,
}

impl TcpCommandSink {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl CommandSink for TcpCommandSink {
    async fn deliver(&self, command: &ForwardedCommand) -> io::Result<()> {
        let destination = command.destination();
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(destination))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {destination} timed out"),
                )
            })??;

        stream.write_all(&command.command().pack()).await?;
        stream.shutdown().await
    }
}

/// Drain the forwarding queue until shutdown or until every sender is gone.
pub async fn run_forwarder(
    sink: Arc<dyn CommandSink>,
    mut queue: mpsc::Receiver<ForwardedCommand>,
    mut shutdown: Shutdown,
) {
    info!("Forwarder started");
    loop {
        let command = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(command) => command,
                None => break,
            },
        };

        let destination = command.destination();
        match sink.deliver(&command).await {
            Ok(()) => debug!(%destination, command = %command.command(), "Forwarded device command"),
            Err(e) => warn!(%destination, error = %e, "Failed to forward device command"),
        }
    }
    info!("Forwarder stopped");
}
