//! Fake daemon on a Unix socket, shared by the integration tests

#![allow(dead_code)]

use clap::Parser;
use dockside::cli::{Cli, CommandContext, Commands};
use dockside::client::DaemonClient;
use dockside::config::{ConfigFile, Endpoint, Settings};
use dockside::stream::{StdStream, StdWriter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

pub const API_VERSION: &str = "1.24";

/// A request as the daemon received it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path without the version prefix
    pub path: String,
    pub query: String,
    /// The client asked for a connection upgrade
    pub upgrade: bool,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn is(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path == path
    }
}

/// How the daemon answers one request
pub enum Reply {
    Json(u16, String),
    Empty(u16),
    /// Answer `101`, send the frames, then close without reading stdin
    Upgrade(Vec<(StdStream, &'static [u8])>),
    /// Answer `101`, send the frames, then echo stdin back once it ends
    UpgradeEcho(Vec<(StdStream, &'static [u8])>),
    /// `200` with a raw streamed body
    Body(Vec<u8>),
}

pub fn json(body: &str) -> Reply {
    Reply::Json(200, body.to_string())
}

pub fn not_found(what: &str) -> Reply {
    Reply::Json(404, format!(r#"{{"message":"No such container: {}"}}"#, what))
}

type Routes = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

pub struct FakeDaemon {
    pub socket: PathBuf,
    log: Arc<Mutex<Vec<Recorded>>>,
    _dir: TempDir,
}

impl FakeDaemon {
    /// Serve `routes` on a fresh socket until the test's runtime ends
    pub fn start<F>(routes: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let routes: Routes = Arc::new(routes);

        let accept_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, routes.clone(), accept_log.clone()));
            }
        });

        Self {
            socket,
            log,
            _dir: dir,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::Unix(self.socket.clone())
    }

    pub fn host(&self) -> String {
        format!("unix://{}", self.socket.display())
    }

    pub fn client(&self) -> DaemonClient {
        DaemonClient::new(self.endpoint(), API_VERSION)
    }

    /// Context for calling command handlers with non-terminal stdio
    pub fn context(&self) -> CommandContext {
        CommandContext {
            settings: Settings {
                endpoint: self.endpoint(),
                api_version: API_VERSION.to_string(),
                config_file: ConfigFile::default(),
            },
            client: self.client(),
            stdin_is_terminal: false,
            stdout_is_terminal: false,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// `METHOD /path` of every request, in arrival order
    pub fn request_lines(&self) -> Vec<String> {
        self.requests().iter().map(Recorded::line).collect()
    }

    pub fn find(&self, method: &str, path: &str) -> Option<Recorded> {
        self.requests().into_iter().find(|r| r.is(method, path))
    }
}

/// Parse a command line the way the binary does
pub fn command(args: &[&str]) -> Commands {
    let mut argv = vec!["dockside"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv).command
}

async fn read_request(stream: &mut UnixStream) -> Recorded {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        buf.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let header = |wanted: &str| {
        head.lines().find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case(wanted).then(|| value.trim().to_string())
        })
    };

    let length = header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();

    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let prefix = format!("/v{}", API_VERSION);

    Recorded {
        method,
        path: path.strip_prefix(&prefix).unwrap_or(path).to_string(),
        query: query.to_string(),
        upgrade: header("upgrade").is_some(),
        body,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        101 => "UPGRADED",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}

/// The client may already be gone, so write errors are ignored
async fn write_frames(stream: &mut UnixStream, frames: &[(StdStream, &[u8])]) {
    for (kind, payload) in frames {
        let mut writer = StdWriter::new(&mut *stream, *kind);
        if writer.write_all(payload).await.is_err() {
            return;
        }
    }
}

async fn serve(mut stream: UnixStream, routes: Routes, log: Arc<Mutex<Vec<Recorded>>>) {
    let request = read_request(&mut stream).await;
    log.lock().unwrap().push(request.clone());

    match routes(&request) {
        Reply::Json(status, body) => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(body.as_bytes()).await.unwrap();
        }
        Reply::Empty(status) => {
            let head = if status == 204 {
                format!("HTTP/1.1 204 {}\r\nConnection: close\r\n\r\n", reason(204))
            } else {
                format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status,
                    reason(status)
                )
            };
            stream.write_all(head.as_bytes()).await.unwrap();
        }
        Reply::Body(body) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/vnd.docker.raw-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
        }
        Reply::Upgrade(frames) => {
            stream
                .write_all(b"HTTP/1.1 101 UPGRADED\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n")
                .await
                .unwrap();
            write_frames(&mut stream, &frames).await;
        }
        Reply::UpgradeEcho(frames) => {
            stream
                .write_all(b"HTTP/1.1 101 UPGRADED\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n")
                .await
                .unwrap();
            write_frames(&mut stream, &frames).await;

            let mut input = Vec::new();
            let _ = stream.read_to_end(&mut input).await;
            write_frames(&mut stream, &[(StdStream::Stdout, &input)]).await;
        }
    }

    let _ = stream.shutdown().await;
}
