//! PID marker file and the `/status` liveness endpoint backed by it.

use anyhow::{bail, Context, Result};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker file holding the daemon PID; removed when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Default location: `<dir>/scout.pid`.
    pub fn default_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(format!("{APP_NAME}.pid"))
    }

    /// Writes the current PID to `path`. Fails if the file already exists.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                bail!(
                    "PID file {} exists, {APP_NAME} daemon already running",
                    path.display()
                );
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create PID file {}", path.display()));
            }
        };

        write!(file, "{}", std::process::id())
            .with_context(|| format!("failed to write PID file {}", path.display()))?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove PID file");
            }
        }
    }
}

/// Answers liveness queries from the presence of the PID file.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    pid_path: PathBuf,
}

impl LivenessProbe {
    pub fn new(pid_path: impl Into<PathBuf>) -> Self {
        Self {
            pid_path: pid_path.into(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.pid_path.is_file()
    }

    /// Builds the response for one request. Only `GET /status` is served.
    pub fn respond(&self, request: &Request<Body>) -> Response<Body> {
        if request.uri().path() != "/status" {
            return empty_response(StatusCode::NOT_FOUND);
        }
        if *request.method() != Method::GET {
            return empty_response(StatusCode::METHOD_NOT_ALLOWED);
        }
        if !self.is_alive() {
            return empty_response(StatusCode::SERVICE_UNAVAILABLE);
        }

        let body = json!({
            "app": APP_NAME,
            "version": APP_VERSION,
            "status": "OK",
        });
        let mut response = Response::new(Body::from(body.to_string()));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Serves the liveness endpoint on `addr` until `shutdown` is cancelled.
///
/// Binding happens before this returns so address errors surface at startup.
pub fn spawn_status_server(
    addr: SocketAddr,
    probe: LivenessProbe,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let probe = Arc::new(probe);
    let make_svc = make_service_fn(move |_| {
        let probe = probe.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let response = probe.respond(&request);
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind status endpoint on {addr}"))?
        .serve(make_svc);
    let local_addr = server.local_addr();
    tracing::info!(addr = %local_addr, "status endpoint listening");

    let handle = tokio::spawn(async move {
        server
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("status endpoint failed")
    });

    Ok((local_addr, handle))
}
