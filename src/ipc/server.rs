//! TCP server for the jobapps service.
//!
//! Accepts client connections, reads one request per connection, runs it
//! against the [`Service`] on the blocking thread pool and writes back the
//! response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::ipc::protocol::{read_message, write_message, Request, Response};
use crate::service::Service;
use crate::{AppError, Result};

/// IPC server for handling requests over TCP.
pub struct IpcServer {
    listener: TcpListener,
    service: Arc<Service>,
}

impl IpcServer {
    /// Bind the server to `addr`.
    pub async fn bind(addr: &str, service: Arc<Service>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Ipc(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting client connections until shutdown.
    ///
    /// Individual client errors are logged but don't stop the server.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        tracing::info!("IPC server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("IPC server shutting down");
                    return Ok(());
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!("Client connected from {}", peer);
                            let service = self.service.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, service).await {
                                    tracing::warn!("Client handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!("Failed to accept client connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_client(mut stream: TcpStream, service: Arc<Service>) -> Result<()> {
    let response = match read_message::<Request, _>(&mut stream).await {
        Ok(request) => {
            let start = Instant::now();
            let kind = request_kind(&request);
            let response = tokio::task::spawn_blocking(move || dispatch(&service, request))
                .await
                .unwrap_or_else(|e| {
                    Response::from_error(&AppError::Ipc(format!("Request handler failed: {}", e)))
                });
            tracing::debug!("{} request handled in {:?}", kind, start.elapsed());
            response
        }
        Err(e @ AppError::Validation(_)) => Response::from_error(&e),
        Err(e) => return Err(e),
    };

    write_message(&mut stream, &response).await
}

fn request_kind(request: &Request) -> &'static str {
    match request {
        Request::Upload { .. } => "upload",
        Request::Query { .. } => "query",
        Request::Update { .. } => "update",
        Request::FileLink { .. } => "file_link",
    }
}

/// Run a request against the service.
fn dispatch(service: &Service, request: Request) -> Response {
    let result = match request {
        Request::Upload { application, files } => files
            .into_iter()
            .map(|f| f.decode())
            .collect::<Result<Vec<_>>>()
            .and_then(|files| service.upload(application, files))
            .map(|receipt| Response::Uploaded {
                message: "Job application received".to_string(),
                application: receipt.application,
                num_files: receipt.num_files,
            }),
        Request::Query { query } => service
            .query(&query)
            .map(|results| Response::Results { results }),
        Request::Update { id, application } => service
            .update(&id, application)
            .map(|application| Response::Updated {
                message: "Application updated successfully".to_string(),
                application,
            }),
        Request::FileLink { id, file_name } => service
            .file_link(&id, &file_name)
            .map(|link| Response::FileLink {
                url: link.url,
                expires_at: link.expires_at,
            }),
    };

    result.unwrap_or_else(|e| {
        if e.status_code() >= 500 {
            tracing::error!("Request failed: {}", e);
        } else {
            tracing::debug!("Request rejected: {}", e);
        }
        Response::from_error(&e)
    })
}
