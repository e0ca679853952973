use bytes::Bytes;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, trace};

use crate::{AppState, ws::status_frame};

const READ_BUFFER_SIZE: usize = 1024;

pub async fn handle_upgrade(on_upgrade: OnUpgrade, state: AppState) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            debug!(error = %e, "websocket upgrade did not complete");
            return;
        }
    };

    let (conn_id, frames) = state.sockets.write().await.register();

    async {
        let (reader, writer) = tokio::io::split(TokioIo::new(upgraded));
        let mut controller = StatusController::new(
            reader,
            writer,
            frames,
            state.ws_graceful_shutdown.token.child_token(),
        );
        debug!("websocket connected");

        match status_frame(&state.identity) {
            Ok(frame) => {
                if controller.send(&frame).await {
                    while controller.next().await {}
                }
            }
            Err(e) => error!(error = %e, "failed to encode status message"),
        }

        controller.writer.shutdown().await.ok();
        state.sockets.write().await.unregister(conn_id);
        debug!("websocket disconnected");
    }
    .instrument(debug_span!("status_ws", conn_id))
    .await
}

/// Drives one connection: writes queued frames, drops whatever the client
/// sends, and stops on peer close, write failure or shutdown. Shutdown also
/// interrupts a write stuck on a client that stopped reading.
struct StatusController<R, W> {
    reader: R,
    writer: W,
    frames: mpsc::Receiver<Bytes>,
    cancellation_token: CancellationToken,
    read_buf: [u8; READ_BUFFER_SIZE],
}

impl<R, W> StatusController<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    fn new(
        reader: R,
        writer: W,
        frames: mpsc::Receiver<Bytes>,
        cancellation_token: CancellationToken,
    ) -> Self {
        StatusController {
            reader,
            writer,
            frames,
            cancellation_token,
            read_buf: [0; READ_BUFFER_SIZE],
        }
    }

    /// Write one frame; false when the connection should be dropped.
    async fn send(&mut self, frame: &Bytes) -> bool {
        let write = async {
            self.writer.write_all(frame).await?;
            self.writer.flush().await
        };

        tokio::select! {
            res = write => match res {
                Ok(()) => true,
                Err(e) => {
                    trace!(error = %e, "websocket write failed");
                    false
                }
            },
            _ = self.cancellation_token.cancelled() => {
                trace!("server is shutting down, write abandoned");
                false
            }
        }
    }

    async fn next(&mut self) -> bool {
        tokio::select! {
            frame = self.frames.recv() => {
                let Some(frame) = frame else {
                    return false; // deregistered
                };

                self.send(&frame).await
            }
            read = self.reader.read(&mut self.read_buf) => {
                match read {
                    Ok(0) => false, // connection closed
                    Ok(n) => {
                        trace!(n, "ignoring inbound bytes");
                        true
                    }
                    Err(e) => {
                        trace!(error = %e, "websocket read failed");
                        false
                    }
                }
            }
            _ = self.cancellation_token.cancelled() => {
                trace!("server is shutting down");
                false
            }
        }
    }
}
