//! Config container listener.
//!
//! The host connects to a Unix socket once per request. Requests are served
//! strictly one at a time: read to EOF, dispatch, write the response, close.
//! Any failure stops the listener and is returned to the caller, who decides
//! whether to exit.

pub mod accept;
pub mod dispatch;
pub mod session;

pub use dispatch::Dispatcher;
pub use session::Session;

use crate::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::protocol::{read_request, write_response};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

/// A bound config socket.
pub struct Listener {
    listener: UnixListener,
    socket_path: PathBuf,
    release_dir: PathBuf,
}

impl Listener {
    /// Bind the configured socket, replacing any stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &ListenerConfig) -> Result<Self> {
        let socket_path = config.socket_path.clone();

        if let Some(parent) = socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::SocketDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(socket = %socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(socket = %socket_path.display(), error = %e, "could not remove stale socket"),
        }

        let listener = UnixListener::bind(&socket_path).map_err(|source| Error::Bind {
            path: socket_path.clone(),
            source,
        })?;

        info!(
            socket = %socket_path.display(),
            release_dir = %config.release_dir.display(),
            "listening"
        );

        Ok(Self {
            listener,
            socket_path,
            release_dir: config.release_dir.clone(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve requests until `shutdown` completes or something fails.
    ///
    /// Shutdown is only observed between requests. Connections accepted but
    /// not yet read are dropped. The socket file is removed on return.
    pub async fn serve<H, F>(self, handler: H, shutdown: F) -> Result<()>
    where
        H: Handler,
        F: Future<Output = ()>,
    {
        let Listener {
            listener,
            socket_path,
            release_dir,
        } = self;

        let (accept_task, mut connections) = accept::spawn_accept_loop(listener);
        let mut dispatcher = Dispatcher::new(handler, release_dir);
        tokio::pin!(shutdown);

        let result = loop {
            let stream = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(socket = %socket_path.display(), "shutting down");
                    break Ok(());
                }
                accepted = connections.recv() => match accepted {
                    Some(Ok(stream)) => stream,
                    Some(Err(e)) => break Err(Error::Accept(e)),
                    None => break Err(Error::AcceptLoopClosed(socket_path.clone())),
                },
            };

            if let Err(e) = handle_connection(&mut dispatcher, stream, &socket_path).await {
                break Err(e);
            }
        };

        accept_task.abort();
        remove_socket(&socket_path);
        result
    }
}

/// Bind using `config` and serve until SIGTERM.
pub async fn listen<H: Handler>(handler: H, config: &ListenerConfig) -> Result<()> {
    let listener = Listener::bind(config)?;
    let mut sigterm = signal(SignalKind::terminate())?;
    listener
        .serve(handler, async move {
            sigterm.recv().await;
        })
        .await
}

async fn handle_connection<H: Handler>(
    dispatcher: &mut Dispatcher<H>,
    mut stream: UnixStream,
    socket_path: &Path,
) -> Result<()> {
    let raw = read_request(&mut stream)
        .await
        .map_err(|source| Error::ReadRequest {
            path: socket_path.to_path_buf(),
            source,
        })?;
    let response = dispatcher.dispatch(&raw).await?;
    write_response(&mut stream, &response).await
}

fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(socket = %path.display(), error = %e, "could not remove socket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ConfigureReleaseRequest, ConfigureReleaseResponse, PrepareTerraformRequest,
        PrepareTerraformResponse, SetupRequest, SetupResponse, UploadReleaseRequest,
        UploadReleaseResponse,
    };
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn setup(&self, _: &SetupRequest, _: &mut SetupResponse) -> anyhow::Result<()> {
            Ok(())
        }

        async fn configure_release(
            &self,
            _: &ConfigureReleaseRequest,
            _: &mut ConfigureReleaseResponse,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn upload_release(
            &self,
            _: &UploadReleaseRequest,
            _: &mut UploadReleaseResponse,
            _: Option<&ConfigureReleaseRequest>,
            _: &Path,
        ) -> anyhow::Result<()> {
            anyhow::bail!("upload failed")
        }

        async fn prepare_terraform(
            &self,
            _: &PrepareTerraformRequest,
            _: &mut PrepareTerraformResponse,
            _: &Path,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn send(path: &Path, request: &[u8]) -> Vec<u8> {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_bind_creates_dirs_and_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("nested/dir/sock");
        let config = ListenerConfig::new(&socket_path, dir.path());

        let first = Listener::bind(&config).unwrap();
        drop(first);
        assert!(socket_path.exists());

        let second = Listener::bind(&config).unwrap();
        assert_eq!(second.socket_path(), socket_path);
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("sock");
        let listener = Listener::bind(&ListenerConfig::new(&socket_path, dir.path())).unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(listener.serve(Noop, async move {
            let _ = stop_rx.await;
        }));

        let response = send(&socket_path, br#"{"Action":"setup"}"#).await;
        assert_eq!(response, b"{\"Success\":true}\n");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_handler_error_stops_listener() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("sock");
        let listener = Listener::bind(&ListenerConfig::new(&socket_path, dir.path())).unwrap();
        let server = tokio::spawn(listener.serve(Noop, std::future::pending::<()>()));

        // No error response is written, the connection is just closed
        let response = send(&socket_path, br#"{"Action":"upload_release"}"#).await;
        assert!(response.is_empty());

        let err = server.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "error in upload_release: upload failed");
    }

    #[tokio::test]
    async fn test_unknown_action_stops_listener() {
        let dir = TempDir::new().unwrap();
        let socket_path = dir.path().join("sock");
        let listener = Listener::bind(&ListenerConfig::new(&socket_path, dir.path())).unwrap();
        let server = tokio::spawn(listener.serve(Noop, std::future::pending::<()>()));

        send(&socket_path, br#"{"Action":"bogus"}"#).await;

        let err = server.await.unwrap().unwrap_err();
        assert!(err.is_protocol_violation());
    }
}
