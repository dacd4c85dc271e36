//! Lifecycle controller: wires the bridge together and tears it down.

use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::forward::{run_forwarder, CommandSink, TcpCommandSink};
use crate::pending::eviction_task;
use crate::port::SerialHandle;
use crate::reader::SerialReader;
use crate::session::{handle_connection, SessionOutcome};
use crate::shutdown;
use crate::state::{BridgeSettings, BridgeState, SharedBridge};
use crate::wire::FrameError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// A bound listener plus the bridge it serves.
pub struct Gateway {
    listener: TcpListener,
    state: SharedBridge,
    sink: Arc<dyn CommandSink>,
    forward_queue: usize,
}

enum Stop {
    Signal,
    Reader(Result<Result<(), FrameError>, JoinError>),
}

impl Gateway {
    /// Validate `config`, take ownership of the opened link and bind the
    /// TCP listener. Nothing runs until [`Gateway::run`].
    pub async fn bind(config: &Config, link: SerialHandle) -> GatewayResult<Self> {
        let settings = BridgeSettings::try_from(config)?;
        let addr = config.server.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;

        Ok(Self {
            listener,
            state: BridgeState::new(link, settings).shared(),
            sink: Arc::new(TcpCommandSink::new(config.server.forward_connect_timeout())),
            forward_queue: config.bridge.forward_queue,
        })
    }

    /// Replace where device-originated commands are delivered.
    pub fn with_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn local_addr(&self) -> GatewayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &SharedBridge {
        &self.state
    }

    /// Serve clients until `signal` resolves or the serial reader stops.
    ///
    /// Either way every task is cancelled and awaited before returning. A
    /// reader that stopped because framing broke yields
    /// [`GatewayError::LinkDesynchronized`].
    pub async fn run<F>(self, signal: F) -> GatewayResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            state,
            sink,
            forward_queue,
        } = self;
        let settings = state.settings().clone();

        let (trigger, token) = shutdown::channel();
        let (forward_tx, forward_rx) = mpsc::channel(forward_queue);

        let mut reader = tokio::spawn(SerialReader::new(state.clone(), forward_tx).run(token.clone()));
        let mut background = JoinSet::new();
        background.spawn(run_forwarder(sink, forward_rx, token.clone()));
        background.spawn(eviction_task(
            state.pending().clone(),
            settings.result_ttl,
            settings.eviction_interval,
            token.clone(),
        ));

        info!(
            addr = %listener.local_addr()?,
            link = %state.link_name(),
            chunk_size = settings.chunk_size,
            "Gateway listening"
        );

        let mut sessions = JoinSet::new();
        let mut served = 0u64;
        tokio::pin!(signal);

        let stop = loop {
            tokio::select! {
                _ = &mut signal => break Stop::Signal,
                joined = &mut reader => break Stop::Reader(joined),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        served += 1;
                        if state.bridge_busy() {
                            debug!(%peer, "Transaction in progress, client will queue");
                        }
                        sessions.spawn(handle_connection(state.clone(), stream, peer, token.clone()));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
                Some(done) = sessions.join_next(), if !sessions.is_empty() => log_session(done),
            }
        };

        match stop {
            Stop::Signal => info!("Shutdown requested"),
            Stop::Reader(_) => warn!("Serial reader stopped, shutting down"),
        }
        drop(listener);
        trigger.trigger();

        let reader_result = match stop {
            Stop::Reader(joined) => joined,
            Stop::Signal => reader.await,
        };
        while let Some(done) = sessions.join_next().await {
            log_session(done);
        }
        while let Some(done) = background.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Background task failed");
            }
        }

        let stats = state.pending().stats();
        info!(
            sessions = served,
            results_filed = stats.filed(),
            results_evicted = stats.evicted(),
            "Gateway stopped"
        );

        match reader_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::LinkDesynchronized(e)),
            Err(e) => Err(GatewayError::TaskFailed(e.to_string())),
        }
    }
}

fn log_session(done: Result<SessionOutcome, JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "Session task failed");
    }
}
