//! Network fetch backends
//!
//! `http`/`https` requests go through a `ureq` agent on the blocking pool.
//! `file://` requests are served from the local filesystem so an application
//! build directory can act as the origin.

use crate::config::schema::NetworkConfig;
use crate::error::{SwcacheError, SwcacheResult};
use crate::network::message::{Headers, Method, Request, Response};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::debug;

/// Abstract network interface used by the interceptor and the installer
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are responses, not errors.
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response>;
}

/// Default fetcher for real origins
pub struct NetworkFetcher {
    agent: ureq::Agent,
    user_agent: String,
    max_body_bytes: u64,
}

impl NetworkFetcher {
    pub fn new(config: &NetworkConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    fn fetch_http(
        agent: &ureq::Agent,
        user_agent: &str,
        max_body_bytes: u64,
        request: Request,
    ) -> SwcacheResult<Response> {
        let url = request.url.to_string();

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(url.as_str())
            .header("user-agent", user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = match request.body {
            Some(body) => {
                let req = builder
                    .body(body)
                    .map_err(|e| SwcacheError::network(&url, e))?;
                agent.run(req)
            }
            None => {
                let req = builder
                    .body(())
                    .map_err(|e| SwcacheError::network(&url, e))?;
                agent.run(req)
            }
        };

        let mut response = result.map_err(|e| SwcacheError::network(&url, e))?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response
            .body_mut()
            .with_config()
            .limit(max_body_bytes)
            .read_to_vec()
            .map_err(|e| SwcacheError::network(&url, e))?;

        Ok(Response {
            status,
            headers,
            body,
            url,
        })
    }

    async fn fetch_file(&self, request: &Request) -> SwcacheResult<Response> {
        let url = request.url.to_string();

        if !matches!(request.method, Method::Get | Method::Head) {
            return Ok(Response::new(405, Vec::new()).with_url(url));
        }

        let mut path = request
            .url
            .to_file_path()
            .map_err(|_| SwcacheError::InvalidUrl {
                url: url.clone(),
                reason: "not a local file path".to_string(),
            })?;

        if tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            path = path.join("index.html");
        }

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() > self.max_body_bytes {
                return Err(SwcacheError::network(
                    &url,
                    format!(
                        "body of {} bytes exceeds network.max_body_bytes ({})",
                        meta.len(),
                        self.max_body_bytes
                    ),
                ));
            }
        }

        match tokio::fs::read(&path).await {
            Ok(body) => {
                let body = if request.method == Method::Head {
                    Vec::new()
                } else {
                    body
                };
                Ok(Response::new(200, body)
                    .with_header("content-type", content_type_for(&path))
                    .with_url(url))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No file at {}, answering 404", path.display());
                Ok(Response::new(404, Vec::new()).with_url(url))
            }
            Err(e) => Err(SwcacheError::network(&url, e)),
        }
    }
}

#[async_trait]
impl Fetcher for NetworkFetcher {
    async fn fetch(&self, request: &Request) -> SwcacheResult<Response> {
        debug!("Network {} {}", request.method, request.url);

        match request.url.scheme() {
            "file" => self.fetch_file(request).await,
            "http" | "https" => {
                let agent = self.agent.clone();
                let user_agent = self.user_agent.clone();
                let max_body_bytes = self.max_body_bytes;
                let request = request.clone();
                tokio::task::spawn_blocking(move || {
                    Self::fetch_http(&agent, &user_agent, max_body_bytes, request)
                })
                    .await
                    .map_err(|e| SwcacheError::Internal(format!("fetch task failed: {e}")))?
            }
            other => Err(SwcacheError::network(
                request.url.as_str(),
                format!("unsupported scheme '{other}'"),
            )),
        }
    }
}

/// Flatten response headers. Repeated names are joined with ", " in
/// arrival order so no value is dropped.
fn collect_headers(map: &ureq::http::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|joined: &mut String| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}

/// Guess a content type from the file extension
fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("webmanifest") => "application/manifest+json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
