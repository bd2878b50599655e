//! Non-blocking HTTP sessions.
//!
//! A session wraps one in-flight GET. The body is pulled on the Tokio runtime
//! and handed to the tick thread through a bounded channel; [`HttpSession::read`]
//! never waits.

use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use url::Url;

use crate::provider::ProviderError;

/// Chunks buffered between the body task and the tick thread.
const CHANNEL_CAPACITY: usize = 16;

/// Connect timeout for new sessions.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRead {
    /// Nothing available yet.
    Pending,
    /// Response status line and headers arrived.
    Head {
        status: u16,
        content_length: Option<u64>,
    },
    /// Body bytes, never more than the requested maximum.
    Data(Bytes),
    /// The body is complete.
    End,
}

/// One in-flight request/response exchange.
pub trait HttpSession: Send {
    /// Read whatever is available, at most `max` body bytes.
    fn read(&mut self, max: usize) -> Result<SessionRead, ProviderError>;
}

/// Opens sessions. Shared by every transfer of a provider.
pub trait HttpConnector: Send + Sync {
    fn open(&self, url: &Url) -> Result<Box<dyn HttpSession>, ProviderError>;
}

/// Messages from the body task.
#[derive(Debug)]
enum Chunk {
    Head {
        status: u16,
        content_length: Option<u64>,
    },
    Data(Bytes),
}

/// Connector backed by an async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    client: reqwest::Client,
    runtime: Handle,
}

impl ReqwestConnector {
    /// Build the client. Fails if the TLS stack cannot be initialized.
    pub fn new(runtime: Handle) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        Ok(Self { client, runtime })
    }
}

impl HttpConnector for ReqwestConnector {
    fn open(&self, url: &Url) -> Result<Box<dyn HttpSession>, ProviderError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let request = self.client.get(url.clone());
        let url = url.to_string();

        let task = self.runtime.spawn(async move {
            let mut response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Transport(e.to_string()))).await;
                    return;
                }
            };

            let head = Chunk::Head {
                status: response.status().as_u16(),
                content_length: response.content_length(),
            };
            if tx.send(Ok(head)).await.is_err() {
                return;
            }

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        if tx.send(Ok(Chunk::Data(bytes))).await.is_err() {
                            debug!(%url, "Session dropped before body finished");
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Transport(e.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::new(ReqwestSession::new(rx, Some(task))))
    }
}

/// Session fed by a body task.
///
/// A chunk larger than the caller's read limit is split and the remainder is
/// returned by the following reads.
struct ReqwestSession {
    receiver: mpsc::Receiver<Result<Chunk, ProviderError>>,
    leftover: Option<Bytes>,
    task: Option<JoinHandle<()>>,
}

impl ReqwestSession {
    fn new(
        receiver: mpsc::Receiver<Result<Chunk, ProviderError>>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            receiver,
            leftover: None,
            task,
        }
    }

    fn take(&mut self, mut bytes: Bytes, max: usize) -> SessionRead {
        if bytes.len() > max {
            self.leftover = Some(bytes.split_off(max));
        }
        SessionRead::Data(bytes)
    }
}

impl HttpSession for ReqwestSession {
    fn read(&mut self, max: usize) -> Result<SessionRead, ProviderError> {
        if let Some(bytes) = self.leftover.take() {
            return Ok(self.take(bytes, max));
        }

        match self.receiver.try_recv() {
            Ok(Ok(Chunk::Head {
                status,
                content_length,
            })) => Ok(SessionRead::Head {
                status,
                content_length,
            }),
            Ok(Ok(Chunk::Data(bytes))) => {
                trace!(bytes = bytes.len(), "Body chunk");
                Ok(self.take(bytes, max))
            }
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) => Ok(SessionRead::Pending),
            Err(TryRecvError::Disconnected) => Ok(SessionRead::End),
        }
    }
}

impl Drop for ReqwestSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
