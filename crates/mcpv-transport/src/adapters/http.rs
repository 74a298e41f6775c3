//! Streamable-HTTP transport adapter: connects using a server spec's
//! endpoint, headers, and proxy fields.

use std::time::Duration;

use async_trait::async_trait;
use mcpv_types::spec::{ServerSpec, Transport as SpecTransport};
use reqwest::Client;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::traits::{Conn, Connected, Transport};

/// Connects by establishing an HTTP client configured with the spec's
/// endpoint, static headers, and optional proxy; each [`Conn::call`] is a
/// single POST carrying one JSON-RPC frame.
#[derive(Debug, Default)]
pub struct HttpTransport;

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, spec: &ServerSpec) -> TransportResult<Connected> {
        let SpecTransport::StreamableHttp {
            endpoint,
            headers,
            max_retries,
            proxy,
        } = &spec.transport
        else {
            return Err(TransportError::InvalidEndpoint(
                "spec is not a streamable-http transport".to_string(),
            ));
        };

        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let mut builder = Client::builder();
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            header_map.insert(name, value);
        }

        let conn = HttpConn {
            client,
            url,
            headers: header_map,
            max_retries: *max_retries,
        };

        Ok(Connected {
            conn: Box::new(conn),
            stop: Box::new(|| Box::pin(async {})),
        })
    }
}

/// A [`Conn`] backed by a streamable-HTTP session: one POST per call,
/// retried up to `max_retries` times on a transient send failure.
struct HttpConn {
    client: Client,
    url: reqwest::Url,
    headers: reqwest::header::HeaderMap,
    max_retries: u32,
}

#[async_trait]
impl Conn for HttpConn {
    async fn call(&self, payload: Vec<u8>, timeout: Duration) -> TransportResult<Vec<u8>> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            let result = self
                .client
                .post(self.url.clone())
                .headers(self.headers.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .body(payload.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
                    return Ok(bytes.to_vec());
                }
                Ok(response) => {
                    last_err = Some(TransportError::ReceiveFailed(format!(
                        "server returned status {}",
                        response.status()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    return Err(TransportError::Timeout {
                        operation: "http call".to_string(),
                    });
                }
                Err(e) => {
                    last_err = Some(TransportError::SendFailed(e.to_string()));
                }
            }
            debug!(attempt, "streamable-http call attempt failed, retrying");
        }
        Err(last_err.unwrap_or(TransportError::ConnClosed))
    }

    async fn close(&self) {}
}
