//! Daemon HTTP API client
//!
//! Every request opens its own connection to the daemon (Unix socket or
//! TCP) and speaks HTTP/1.1 over it. Attach and exec-start requests ask the
//! daemon to upgrade the connection and hand back the raw stream.

pub mod hijack;
pub mod types;

use crate::config::Endpoint;
use crate::{DocksideError, Result, APP_NAME, VERSION};
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper::header::{CONNECTION, CONTENT_TYPE, HOST, UPGRADE, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_util::io::StreamReader;
use url::{Position, Url};

pub use hijack::HijackedResponse;
use types::*;

/// Any bidirectional byte stream the HTTP connection can run over
trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Streamed response body, such as container logs
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Client for the daemon's HTTP API
#[derive(Debug, Clone)]
pub struct DaemonClient {
    endpoint: Endpoint,
    api_version: String,
}

impl DaemonClient {
    /// Create a client for an endpoint and API version
    pub fn new(endpoint: Endpoint, api_version: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_version: api_version.into(),
        }
    }

    // ---------------------------------------------------------------------
    // Containers
    // ---------------------------------------------------------------------

    /// `GET /containers/{id}/json`
    pub async fn container_inspect(&self, id: &str) -> Result<ContainerJson> {
        let path = api_path(&["containers", id, "json"], &[])?;
        self.get_json(&path).await
    }

    /// `POST /containers/create`
    pub async fn container_create(
        &self,
        config: &ContainerConfig,
        name: Option<&str>,
    ) -> Result<ContainerCreateResponse> {
        let params: Vec<(&str, String)> = name
            .filter(|n| !n.is_empty())
            .map(|n| ("name", n.to_string()))
            .into_iter()
            .collect();
        let path = api_path(&["containers", "create"], &params)?;
        self.post_json(&path, Some(config)).await
    }

    /// `POST /containers/{id}/start`
    pub async fn container_start(&self, id: &str) -> Result<()> {
        let path = api_path(&["containers", id, "start"], &[])?;
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    /// `POST /containers/{id}/kill?signal=`
    pub async fn container_kill(&self, id: &str, signal: &str) -> Result<()> {
        let path = api_path(&["containers", id, "kill"], &[("signal", signal.to_string())])?;
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    /// `POST /containers/{id}/resize?h=&w=`
    pub async fn container_resize(&self, id: &str, height: u16, width: u16) -> Result<()> {
        let path = api_path(
            &["containers", id, "resize"],
            &[("h", height.to_string()), ("w", width.to_string())],
        )?;
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    /// `POST /containers/{id}/wait`, returns the exit status
    pub async fn container_wait(&self, id: &str) -> Result<i32> {
        let path = api_path(&["containers", id, "wait"], &[])?;
        let response: ContainerWaitResponse = self.post_json::<_, ()>(&path, None).await?;
        Ok(response.status_code as i32)
    }

    /// `DELETE /containers/{id}?v=`
    pub async fn container_remove(&self, id: &str, remove_volumes: bool) -> Result<()> {
        let path = api_path(&["containers", id], &[("v", flag(remove_volumes))])?;
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    /// `POST /containers/{id}/attach`, hijacking the connection
    pub async fn container_attach(
        &self,
        id: &str,
        options: &AttachOptions,
    ) -> Result<HijackedResponse> {
        let mut params = vec![
            ("stream", flag(options.stream)),
            ("stdin", flag(options.stdin)),
            ("stdout", flag(options.stdout)),
            ("stderr", flag(options.stderr)),
        ];
        if let Some(keys) = options.detach_keys.as_deref().filter(|k| !k.is_empty()) {
            params.push(("detachKeys", keys.to_string()));
        }
        let path = api_path(&["containers", id, "attach"], &params)?;
        self.hijack(&path, None).await
    }

    /// `GET /containers/{id}/logs`, streaming the body as it arrives
    pub async fn container_logs(&self, id: &str, options: &LogsOptions) -> Result<BodyReader> {
        let mut params = vec![
            ("stdout", flag(options.stdout)),
            ("stderr", flag(options.stderr)),
            ("follow", flag(options.follow)),
            ("timestamps", flag(options.timestamps)),
            ("tail", options.tail.clone()),
        ];
        if let Some(since) = options.since.as_deref().filter(|s| !s.is_empty()) {
            params.push(("since", since.to_string()));
        }
        let path = api_path(&["containers", id, "logs"], &params)?;
        self.stream(Method::GET, &path).await
    }

    // ---------------------------------------------------------------------
    // Exec
    // ---------------------------------------------------------------------

    /// `POST /containers/{id}/exec`
    pub async fn exec_create(&self, container: &str, config: &ExecConfig) -> Result<ExecCreateResponse> {
        let path = api_path(&["containers", container, "exec"], &[])?;
        self.post_json(&path, Some(config)).await
    }

    /// `POST /exec/{id}/start` without hijacking (detached exec)
    pub async fn exec_start(&self, id: &str, check: &ExecStartCheck) -> Result<()> {
        let path = api_path(&["exec", id, "start"], &[])?;
        let body = serde_json::to_vec(check)?;
        self.request(Method::POST, &path, Some(body)).await?;
        Ok(())
    }

    /// `POST /exec/{id}/start`, hijacking the connection
    pub async fn exec_attach(&self, id: &str, config: &ExecConfig) -> Result<HijackedResponse> {
        let path = api_path(&["exec", id, "start"], &[])?;
        let body = serde_json::to_vec(config)?;
        self.hijack(&path, Some(body)).await
    }

    /// `GET /exec/{id}/json`
    pub async fn exec_inspect(&self, id: &str) -> Result<ExecInspect> {
        let path = api_path(&["exec", id, "json"], &[])?;
        self.get_json(&path).await
    }

    /// `POST /exec/{id}/resize?h=&w=`
    pub async fn exec_resize(&self, id: &str, height: u16, width: u16) -> Result<()> {
        let path = api_path(
            &["exec", id, "resize"],
            &[("h", height.to_string()), ("w", width.to_string())],
        )?;
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let body = body.map(serde_json::to_vec).transpose()?;
        let response = self.request(Method::POST, path, body).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// Send a request and fail on a non-2xx status
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Response<Incoming>> {
        let mut sender = self.open(false).await?;
        let request = self.build_request(method, path, body, false)?;

        tracing::debug!("{} {}", request.method(), request.uri());
        let response = sender.send_request(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.into_body().collect().await?.to_bytes();
            return Err(daemon_error(status, &body));
        }
        Ok(response)
    }

    /// Perform a request and return the full response body
    async fn request(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Bytes> {
        let response = self.send(method, path, body).await?;
        Ok(response.into_body().collect().await?.to_bytes())
    }

    /// Perform a request and hand back the body as a byte stream
    async fn stream(&self, method: Method, path: &str) -> Result<BodyReader> {
        let response = self.send(method, path, None).await?;
        let chunks = response.into_body().into_data_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(chunks))))
    }

    /// Perform a request that upgrades the connection to a raw stream
    async fn hijack(&self, path: &str, body: Option<Vec<u8>>) -> Result<HijackedResponse> {
        let mut sender = self.open(true).await?;
        let request = self.build_request(Method::POST, path, body, true)?;

        tracing::debug!("[hijack] {} {}", request.method(), request.uri());
        let response: Response<Incoming> = sender.send_request(request).await?;
        let status = response.status();

        if status == StatusCode::SWITCHING_PROTOCOLS {
            let upgraded = hyper::upgrade::on(response).await?;
            return Ok(HijackedResponse::from_stream(TokioIo::new(upgraded)));
        }

        let body = response.into_body().collect().await?.to_bytes();
        if status.is_success() {
            return Err(DocksideError::UnsupportedUpgrade(status.as_u16()));
        }
        Err(daemon_error(status, &body))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        hijack: bool,
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/v{}{}", self.api_version, path))
            .header(HOST, self.host_header())
            .header(USER_AGENT, format!("{}/{}", APP_NAME, VERSION));

        if hijack {
            builder = builder.header(CONNECTION, "Upgrade").header(UPGRADE, "tcp");
        }

        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };

        builder
            .body(body)
            .map_err(|e| DocksideError::InvalidRequest(e.to_string()))
    }

    fn host_header(&self) -> String {
        match &self.endpoint {
            Endpoint::Unix(_) => "docker".to_string(),
            Endpoint::Tcp { .. } => self.endpoint.authority(),
        }
    }

    async fn connect(&self) -> Result<Box<dyn Io>> {
        let stream: std::io::Result<Box<dyn Io>> = match &self.endpoint {
            Endpoint::Unix(path) => UnixStream::connect(path)
                .await
                .map(|s| Box::new(s) as Box<dyn Io>),
            Endpoint::Tcp { host, port } => TcpStream::connect((host.as_str(), *port))
                .await
                .map(|s| Box::new(s) as Box<dyn Io>),
        };

        stream.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                DocksideError::ConnectionFailed(self.endpoint.to_string())
            }
            _ => DocksideError::Io(e),
        })
    }

    /// Connect and perform the HTTP/1.1 handshake
    async fn open(&self, upgrades: bool) -> Result<SendRequest<Full<Bytes>>> {
        let io = TokioIo::new(self.connect().await?);
        let (sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        if upgrades {
            tokio::spawn(async move {
                if let Err(e) = conn.with_upgrades().await {
                    tracing::debug!("Hijacked connection closed: {}", e);
                }
            });
        } else {
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!("Connection error: {}", e);
                }
            });
        }

        Ok(sender)
    }
}

/// Convert a failed response into an error, preferring the daemon's message
fn daemon_error(status: StatusCode, body: &[u8]) -> DocksideError {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    if status == StatusCode::NOT_FOUND {
        DocksideError::NotFound(message)
    } else {
        DocksideError::Daemon {
            status: status.as_u16(),
            message,
        }
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Build an API path from raw segments plus query parameters. Segments are
/// percent-encoded individually, so ids containing `/` stay one segment.
fn api_path(segments: &[&str], params: &[(&str, String)]) -> Result<String> {
    let mut url =
        Url::parse("http://docker/").map_err(|e| DocksideError::InvalidRequest(e.to_string()))?;
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }
    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url[Position::BeforePath..].to_string())
}
