//! Thin `reqwest` client against a running gateway's operator endpoints:
//! pool/server status, catalog reload, and per-spec retry.

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::cli::Connection;

/// A handle bound to one gateway's base URL and optional bearer token.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    /// Build a client from the parsed [`Connection`] arguments.
    pub fn new(conn: &Connection) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: conn.url.trim_end_matches('/').to_string(),
            token: conn.token.clone(),
        }
    }

    /// `GET /status/pools`.
    pub async fn pool_status(&self) -> Result<Value> {
        self.get("/status/pools").await
    }

    /// `GET /status/servers`.
    pub async fn server_status(&self) -> Result<Value> {
        self.get("/status/servers").await
    }

    /// `POST /catalog/reload`.
    pub async fn reload(&self) -> Result<Value> {
        self.post_empty("/catalog/reload").await
    }

    /// `POST /catalog/retry/:spec`.
    pub async fn retry(&self, spec: &str) -> Result<()> {
        let url = format!("{}/catalog/retry/{spec}", self.base_url);
        let response = self.authed(self.http.post(url)).send().await.context("sending retry request")?;
        if !response.status().is_success() {
            bail!("retry failed: {}", response.status());
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self.authed(self.http.get(url)).send().await.context("sending request")?;
        if !response.status().is_success() {
            bail!("request failed: {}", response.status());
        }
        response.json().await.context("decoding response body")
    }

    async fn post_empty(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self.authed(self.http.post(url)).send().await.context("sending request")?;
        if !response.status().is_success() {
            bail!("request failed: {}", response.status());
        }
        response.json().await.context("decoding response body")
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}
