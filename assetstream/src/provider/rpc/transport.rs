//! XML-RPC transport.

use std::time::Duration;

use super::xmlrpc::RpcError;
use crate::provider::{BoxFuture, ProviderError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Posts an encoded method call and returns the raw reply body.
pub trait RpcTransport: Send + Sync {
    fn call<'a>(&'a self, endpoint: &'a str, body: String) -> BoxFuture<'a, Result<String, RpcError>>;
}

/// Transport posting `text/xml` bodies with reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestRpcTransport {
    client: reqwest::Client,
}

impl ReqwestRpcTransport {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        Ok(Self { client })
    }
}

impl RpcTransport for ReqwestRpcTransport {
    fn call<'a>(&'a self, endpoint: &'a str, body: String) -> BoxFuture<'a, Result<String, RpcError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(endpoint)
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(body)
                .send()
                .await
                .map_err(|e| RpcError::Http(e.to_string()))?;

            if !response.status().is_success() {
                return Err(RpcError::Status(response.status().as_u16()));
            }

            response
                .text()
                .await
                .map_err(|e| RpcError::Http(e.to_string()))
        })
    }
}

#[cfg(test)]
pub mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Transport answering calls whose body contains a registered needle.
    ///
    /// Calls matching nothing fail with HTTP 404.
    #[derive(Debug, Default)]
    pub struct MockRpcTransport {
        replies: Mutex<Vec<(String, Result<String, RpcError>)>>,
        calls: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
    }

    impl MockRpcTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn reply(&self, needle: &str, reply: Result<String, RpcError>) {
            self.replies.lock().push((needle.to_string(), reply));
        }

        /// `(endpoint, body)` of every call so far.
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    impl RpcTransport for MockRpcTransport {
        fn call<'a>(
            &'a self,
            endpoint: &'a str,
            body: String,
        ) -> BoxFuture<'a, Result<String, RpcError>> {
            Box::pin(async move {
                self.calls.lock().push((endpoint.to_string(), body.clone()));
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.replies
                    .lock()
                    .iter()
                    .find(|(needle, _)| body.contains(needle.as_str()))
                    .map(|(_, reply)| reply.clone())
                    .unwrap_or(Err(RpcError::Status(404)))
            })
        }
    }
}
