use std::io::ErrorKind;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::router::Router;

// Set to false to silence per-connection logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Accepts connections one at a time and serves each inline. Session work is
/// spawned by the router, so a request never waits on sampling.
pub struct AcceptLoop {
    listener: TcpListener,
    router: Router,
    tick: Duration,
    backoff: Duration,
}

impl AcceptLoop {
    pub fn new(listener: TcpListener, router: Router, tick: Duration, backoff: Duration) -> Self {
        Self {
            listener,
            router,
            tick,
            backoff,
        }
    }

    /// Runs until `shutdown` fires. Accept failures are logged and retried.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            log_info!("Listening on {addr}");
        }

        loop {
            // yield to sampling tasks between connections
            tokio::select! {
                _ = time::sleep(self.tick) => {}
                _ = shutdown.cancelled() => break,
            }

            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.cancelled() => break,
            };

            match accepted {
                Ok((stream, addr)) => {
                    log_debug!("Client connected from {addr}");
                    self.router.handle(stream).await;
                }
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    continue;
                }
                Err(err) => {
                    log_error!("Error in server loop: {err}");
                    time::sleep(self.backoff).await;
                }
            }
        }

        log_info!("Accept loop shutting down");
        Ok(())
    }
}
