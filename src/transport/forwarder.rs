//! Relays one request from a byte stream to the config socket and the
//! response back.
//!
//! The config container may still be starting when the host runs the
//! forwarder, so connecting retries for a few seconds before giving up.

use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

/// Connection attempts before giving up.
pub const CONNECT_ATTEMPTS: u32 = 20;

/// Delay between connection attempts.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Connect with the default retry policy (about four seconds).
pub async fn connect(socket_path: &Path) -> Result<UnixStream> {
    connect_with_retry(socket_path, CONNECT_ATTEMPTS, CONNECT_RETRY_INTERVAL).await
}

/// Try to connect up to `attempts` times, sleeping `interval` between tries.
/// The error carries the last dial failure.
pub async fn connect_with_retry(
    socket_path: &Path,
    attempts: u32,
    interval: Duration,
) -> Result<UnixStream> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match UnixStream::connect(socket_path).await {
            Ok(stream) => {
                debug!(socket = %socket_path.display(), attempt, "connected");
                return Ok(stream);
            }
            Err(source) if attempt >= attempts => {
                return Err(Error::Connect {
                    path: socket_path.to_path_buf(),
                    attempts,
                    source,
                });
            }
            Err(e) => {
                debug!(socket = %socket_path.display(), attempt, error = %e, "socket not ready");
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Send `input` to the socket and copy the response to `output`.
///
/// Both directions run concurrently. The call returns once the response has
/// been copied, even if `input` has not reached EOF.
pub async fn forward<R, W>(input: &mut R, output: &mut W, socket_path: &Path) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let stream = connect(socket_path).await?;
    relay(stream, input, output, socket_path).await
}

/// Forward over an already connected stream.
///
/// A send failure is only reported if it happens before the response ends.
pub async fn relay<R, W>(
    mut stream: UnixStream,
    input: &mut R,
    output: &mut W,
    socket_path: &Path,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let (mut from_socket, mut to_socket) = stream.split();

    let send = async {
        let sent = io::copy(input, &mut to_socket).await?;
        to_socket.shutdown().await?;
        Ok::<_, io::Error>(sent)
    };
    let receive = async {
        let received = io::copy(&mut from_socket, output).await?;
        output.flush().await?;
        Ok::<_, io::Error>(received)
    };
    tokio::pin!(send);
    tokio::pin!(receive);

    let mut sending = true;
    let received = loop {
        tokio::select! {
            biased;
            sent = &mut send, if sending => {
                sending = false;
                let sent = sent.map_err(|source| Error::ForwardRequest {
                    path: socket_path.to_path_buf(),
                    source,
                })?;
                debug!(socket = %socket_path.display(), sent, "request sent");
            }
            received = &mut receive => {
                break received.map_err(|source| Error::ForwardResponse {
                    path: socket_path.to_path_buf(),
                    source,
                })?;
            }
        }
    };

    debug!(
        socket = %socket_path.display(),
        received,
        input_finished = !sending,
        "forwarded request"
    );
    Ok(())
}
