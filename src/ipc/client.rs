//! TCP client for the jobapps service.
//!
//! The client is stateless - it connects per request.

use tokio::net::TcpStream;

use crate::ipc::protocol::{read_message, write_message, Request, Response, WireFile};
use crate::record::ApplicationFields;
use crate::search::FilterQuery;
use crate::{AppError, Result};

/// IPC client for sending requests to the jobapps service.
pub struct IpcClient {
    addr: String,
}

impl IpcClient {
    /// Create a client for the service at `addr`.
    ///
    /// The client doesn't establish a connection until a request is sent.
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
        }
    }

    /// Send a request and wait for the response.
    ///
    /// Error responses from the service are returned as `Ok(Response::Error)`;
    /// only transport failures are `Err`.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            AppError::Ipc(format!(
                "Failed to connect to jobapps service at {}: {}. Is the service running?",
                self.addr, e
            ))
        })?;

        write_message(&mut stream, request).await?;
        read_message(&mut stream).await
    }

    pub async fn upload(
        &self,
        application: ApplicationFields,
        files: Vec<WireFile>,
    ) -> Result<Response> {
        self.send(&Request::Upload { application, files }).await
    }

    pub async fn query(&self, query: FilterQuery) -> Result<Response> {
        self.send(&Request::Query { query }).await
    }

    pub async fn update(&self, id: &str, application: ApplicationFields) -> Result<Response> {
        self.send(&Request::Update {
            id: id.to_string(),
            application,
        })
        .await
    }

    pub async fn file_link(&self, id: &str, file_name: &str) -> Result<Response> {
        self.send(&Request::FileLink {
            id: id.to_string(),
            file_name: file_name.to_string(),
        })
        .await
    }
}
