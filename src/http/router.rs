use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::session::{LoggingRequest, SessionController};

use super::form::decode_form;
use super::request::{read_request, RequestLine};
use super::response::Response;

/// The control page, served verbatim.
pub const INDEX_HTML: &str = include_str!("../../assets/index.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    StartLogging,
    StartBatch,
    Status,
    StopLogging,
    NotFound,
}

impl Route {
    /// Exact method and path match; anything unlisted is `NotFound`.
    pub fn resolve(method: &str, path: &str) -> Self {
        match (method, path) {
            ("GET", "/") => Route::Index,
            ("POST", "/start_logging") => Route::StartLogging,
            ("POST", "/start_batch") => Route::StartBatch,
            ("GET", "/status") => Route::Status,
            ("POST", "/stop_logging") => Route::StopLogging,
            _ => Route::NotFound,
        }
    }
}

#[derive(Clone)]
pub struct Router {
    sessions: SessionController,
    read_timeout: Duration,
}

impl Router {
    pub fn new(sessions: SessionController, read_timeout: Duration) -> Self {
        Self {
            sessions,
            read_timeout,
        }
    }

    /// Serves one connection and always shuts it down afterwards.
    pub async fn handle<S>(&self, mut conn: S)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(err) = self.serve(&mut conn).await {
            warn!("Error handling request: {err:#}");
        }
        if let Err(err) = conn.shutdown().await {
            debug!("Connection shutdown failed: {err}");
        }
    }

    async fn serve<S>(&self, conn: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (headers, body) = read_request(conn, self.read_timeout).await;
        if headers.is_empty() {
            return Ok(());
        }

        let response = self.dispatch(&headers, &body).await;
        conn.write_all(&response.to_bytes())
            .await
            .context("failed to send response")?;
        conn.flush().await.context("failed to flush response")?;
        Ok(())
    }

    pub async fn dispatch(&self, headers: &str, body: &str) -> Response {
        let route = RequestLine::parse(headers)
            .map(|line| Route::resolve(&line.method, &line.path))
            .unwrap_or(Route::NotFound);

        match route {
            Route::Index => {
                debug!("Main page served");
                Response::html(INDEX_HTML)
            }
            Route::StartLogging => {
                let request = LoggingRequest::from_form(&decode_form(body), "default");
                info!(
                    "Received /start_logging: duration={}, sample_rate={}, label={}",
                    request.duration_s, request.sample_rate_hz, request.label
                );
                match self.sessions.start_single(request).await {
                    Ok(()) => Response::text("OK"),
                    Err(err) => busy(err),
                }
            }
            Route::StartBatch => {
                let request = LoggingRequest::from_form(&decode_form(body), "batch");
                info!(
                    "Received /start_batch: duration={}, sample_rate={}, label={}",
                    request.duration_s, request.sample_rate_hz, request.label
                );
                match self.sessions.start_batch(request).await {
                    Ok(()) => Response::text("OK"),
                    Err(err) => busy(err),
                }
            }
            Route::Status => {
                let status = self.sessions.status_line().await;
                debug!("Status request served: {status}");
                Response::text(status)
            }
            Route::StopLogging => {
                if self.sessions.stop().await {
                    Response::text("OK")
                } else {
                    Response::conflict("IDLE")
                }
            }
            Route::NotFound => {
                debug!("Unknown request: {}", headers.lines().next().unwrap_or_default());
                Response::not_found()
            }
        }
    }
}

fn busy(err: anyhow::Error) -> Response {
    warn!("Start rejected: {err}");
    Response::conflict(format!("BUSY: {err}"))
}
