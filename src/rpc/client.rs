use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{FleetError, Result};
use crate::rpc::frame::{read_frame, write_frame, Frame};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Vec<u8>, String>>>>>;

/// One dialed connection. Calls may be issued concurrently from any number
/// of tasks; replies are matched back to callers by sequence number. Once
/// the socket dies every pending and future call fails with a transport
/// error, and the owner is expected to dial a fresh client.
#[derive(Debug)]
pub struct RpcClient {
    next_seq: AtomicU64,
    outgoing: mpsc::Sender<Frame>,
    pending: PendingMap,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| FleetError::Transport(format!("dial {addr}: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (mut rd, mut wr) = stream.into_split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Frame>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if let Err(e) = write_frame(&mut wr, &frame).await {
                    tracing::debug!(error = %e, "rpc write failed, closing connection");
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut rd).await {
                    Ok(Frame::Response { seq, result }) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&seq) {
                            let _ = tx.send(result);
                        }
                    }
                    Ok(Frame::Request { method, .. }) => {
                        tracing::warn!(method = %method, "request frame on client connection, dropped");
                    }
                    Err(_) => break,
                }
            }
            // Connection gone: fail everything still waiting.
            for (_, tx) in reader_pending.lock().await.drain() {
                let _ = tx.send(Err("connection closed".to_string()));
            }
        });

        Self {
            next_seq: AtomicU64::new(1),
            outgoing,
            pending,
        }
    }

    /// Issue `method` with `arg` and wait for the matching reply. Each call
    /// parks on its own completion channel, so callers can hold several
    /// calls in flight on the one connection.
    pub async fn call<A, R>(&self, method: &str, arg: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let body = bincode::serialize(arg)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(seq, tx);

        let frame = Frame::Request {
            method: method.to_string(),
            seq,
            body,
        };
        if self.outgoing.send(frame).await.is_err() {
            self.pending.lock().await.remove(&seq);
            return Err(FleetError::Transport("connection closed".to_string()));
        }

        match rx.await {
            Ok(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
            Ok(Err(msg)) => Err(FleetError::Remote(msg)),
            Err(_) => Err(FleetError::Transport("connection closed".to_string())),
        }
    }
}
