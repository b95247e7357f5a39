//! HTTP request capability (`http.request`)
//!
//! - **Methods:** GET, POST, PUT, DELETE
//! - **Request bodies:** any JSON value from the step parameters
//! - **Custom headers:** user-defined headers for authentication, content-type, etc.
//! - **Status code handling:** 2xx = success, anything else fails the step
//!
//! # Security
//!
//! Requests to private, loopback, link-local and cloud metadata addresses are
//! refused unless the step sets `allow_private_ips: true`. Response bodies are
//! capped at `MAX_RESPONSE_SIZE`.

use crate::error::{Result, StepflowError};
use crate::executors::{decode_params, Capability};
use crate::models::{StepParams, MAX_RESPONSE_SIZE};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

fn default_timeout() -> u64 {
    30
}

/// HTTP methods
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Parameters accepted by `http.request`
#[derive(Debug, Clone, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allow_private_ips: bool,
}

/// Response captured from a completed request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub body_truncated: bool,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct HttpCapability {
    /// Reqwest client with connection pooling
    client: Client,
}

impl HttpCapability {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("Stepflow/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StepflowError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Send the request described by `params`
    pub async fn send(&self, params: &HttpParams) -> Result<HttpResponse> {
        validate_http_params(params)?;

        info!("Executing HTTP {:?} request to {}", params.method, params.url);
        debug!("Request headers: {:?}", params.headers);

        let mut request = self
            .client
            .request(params.method.into(), &params.url)
            .timeout(Duration::from_secs(params.timeout_secs));

        for (key, value) in &params.headers {
            request = request.header(key, value);
        }

        if let Some(body) = &params.body {
            debug!("Request body: {}", body);
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!("HTTP request failed: {}", e);
            let message = if e.is_timeout() {
                format!("Request timed out after {} seconds", params.timeout_secs)
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                format!("Request failed: {}", e)
            };
            StepflowError::Http(message)
        })?;

        let status = response.status().as_u16();
        info!("HTTP request completed with status code: {}", status);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StepflowError::Http(format!("Failed to read response body: {}", e)))?;

        let body_truncated = bytes.len() > MAX_RESPONSE_SIZE;
        let body_bytes = if body_truncated {
            warn!(
                "Response body truncated from {} to {} bytes",
                bytes.len(),
                MAX_RESPONSE_SIZE
            );
            &bytes[..MAX_RESPONSE_SIZE]
        } else {
            &bytes[..]
        };

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(body_bytes).to_string(),
            body_truncated,
        })
    }
}

#[async_trait]
impl Capability for HttpCapability {
    async fn execute(&self, params: &StepParams) -> anyhow::Result<Value> {
        let params: HttpParams = decode_params(params)?;
        let response = self.send(&params).await?;

        if !response.is_success() {
            return Err(anyhow::anyhow!(
                "HTTP request failed with status code: {}",
                response.status
            ));
        }

        // JSON bodies are returned structured, anything else as text
        let body = serde_json::from_str::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(response.body.clone()));

        Ok(json!({
            "status": response.status,
            "body": body,
            "body_truncated": response.body_truncated,
        }))
    }
}

/// Validate request parameters, including SSRF protection
pub fn validate_http_params(params: &HttpParams) -> Result<()> {
    if params.url.is_empty() {
        return Err(StepflowError::Validation(
            "HTTP URL cannot be empty".to_string(),
        ));
    }

    let parsed = Url::parse(&params.url)
        .map_err(|e| StepflowError::Validation(format!("Invalid HTTP URL: {}", e)))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(StepflowError::Validation(format!(
            "Invalid URL scheme '{}': only http and https are allowed",
            scheme
        )));
    }

    if params.timeout_secs == 0 || params.timeout_secs > 3600 {
        return Err(StepflowError::Validation(format!(
            "HTTP timeout must be between 1 and 3600 seconds, got: {}",
            params.timeout_secs
        )));
    }

    if params.allow_private_ips {
        warn!(
            "SECURITY WARNING: allow_private_ips is enabled for URL {} - SSRF protection disabled",
            params.url
        );
        return Ok(());
    }

    match parsed.host() {
        Some(Host::Ipv4(ip)) => validate_ipv4_not_private(ip),
        Some(Host::Ipv6(ip)) => validate_ipv6_not_private(ip),
        Some(Host::Domain(domain)) => validate_domain_not_blocked(domain),
        None => Err(StepflowError::Validation(
            "URL must contain a host".to_string(),
        )),
    }
}

fn validate_ipv4_not_private(ip: Ipv4Addr) -> Result<()> {
    if ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() {
        return Err(StepflowError::Http(format!(
            "SSRF protection: requests to {} are blocked",
            ip
        )));
    }
    Ok(())
}

fn validate_ipv6_not_private(ip: Ipv6Addr) -> Result<()> {
    let unique_local = (ip.segments()[0] & 0xfe00) == 0xfc00;
    let link_local = (ip.segments()[0] & 0xffc0) == 0xfe80;
    if ip.is_loopback() || ip.is_unspecified() || unique_local || link_local {
        return Err(StepflowError::Http(format!(
            "SSRF protection: requests to {} are blocked",
            ip
        )));
    }
    Ok(())
}

fn validate_domain_not_blocked(domain: &str) -> Result<()> {
    // Cloud metadata services and localhost aliases
    let blocked_domains = [
        "localhost",
        "metadata.google.internal",
        "metadata",
        "instance-data",
    ];

    let domain_lower = domain.to_lowercase();
    for blocked in &blocked_domains {
        if domain_lower == *blocked || domain_lower.ends_with(&format!(".{}", blocked)) {
            return Err(StepflowError::Http(format!(
                "SSRF protection: requests to '{}' are blocked",
                domain
            )));
        }
    }

    Ok(())
}
