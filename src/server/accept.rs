//! Background accept loop.
//!
//! Accepting runs on its own task so the serving loop can wait on either a
//! new connection or shutdown. Accept errors travel down the channel and stop
//! the listener like any other failure.

use std::io;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Accepted connections (or accept failures) in arrival order.
pub type ConnectionReceiver = mpsc::UnboundedReceiver<io::Result<UnixStream>>;

/// Spawn the accept loop.
///
/// The task ends after forwarding the first accept error, or when the
/// receiver is dropped. Aborting the handle stops it immediately.
pub fn spawn_accept_loop(listener: UnixListener) -> (JoinHandle<()>, ConnectionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        loop {
            let accepted = listener.accept().await.map(|(stream, _addr)| stream);
            let failed = accepted.is_err();
            if tx.send(accepted).is_err() || failed {
                break;
            }
        }
    });
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_accepts_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sock");
        let listener = UnixListener::bind(&path).unwrap();
        let (handle, mut rx) = spawn_accept_loop(listener);

        for byte in [b'a', b'b'] {
            let mut client = UnixStream::connect(&path).await.unwrap();
            client.write_all(&[byte]).await.unwrap();
            client.shutdown().await.unwrap();

            let mut server = rx.recv().await.unwrap().unwrap();
            let mut buf = Vec::new();
            server.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, vec![byte]);
        }

        handle.abort();
    }
}
