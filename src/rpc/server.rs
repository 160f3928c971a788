use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};
use crate::rpc::frame::{read_frame, write_frame, Frame};

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Vec<u8>, String>> + Send>>;
type Handler = Arc<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

/// Method registry plus accept loop. Requests on one connection are
/// dispatched to their own tasks, so replies may interleave and a slow
/// handler never blocks a ping behind it.
#[derive(Default)]
pub struct RpcServer {
    methods: HashMap<String, Handler>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr).await.map_err(|source| FleetError::Bind {
            addr: addr.to_string(),
            source,
        })
    }

    /// Register `Service.Method` with a typed async handler. Argument and
    /// reply types must match the caller's by declaration order; a body
    /// that fails to decode answers as an error frame.
    pub fn register<A, R, F, Fut>(&mut self, method: &str, handler: F)
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let name = method.to_string();
        let wrapped: Handler = Arc::new(move |body: Vec<u8>| {
            let handler = handler.clone();
            let name = name.clone();
            Box::pin(async move {
                let arg: A = bincode::deserialize(&body)
                    .map_err(|e| format!("{name}: bad argument: {e}"))?;
                let reply = handler(arg).await;
                bincode::serialize(&reply).map_err(|e| format!("{name}: bad reply: {e}"))
            })
        });
        self.methods.insert(method.to_string(), wrapped);
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("rpc server stopping");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let server = self.clone();
                            let token = shutdown.clone();
                            tokio::spawn(async move {
                                server.serve_connection(stream, peer, token).await;
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "rpc accept failed"),
                    }
                }
            }
        }
    }

    async fn serve_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let (mut rd, mut wr) = stream.into_split();
        let (reply_tx, mut reply_rx) = mpsc::channel::<Frame>(64);

        let writer = tokio::spawn(async move {
            while let Some(frame) = reply_rx.recv().await {
                if let Err(e) = write_frame(&mut wr, &frame).await {
                    tracing::debug!(error = %e, "rpc reply write failed");
                    break;
                }
            }
        });

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                f = read_frame(&mut rd) => match f {
                    Ok(f) => f,
                    Err(_) => break,
                },
            };
            match frame {
                Frame::Request { method, seq, body } => match self.methods.get(&method) {
                    Some(handler) => {
                        let handler = handler.clone();
                        let reply_tx = reply_tx.clone();
                        tokio::spawn(async move {
                            let result = handler(body).await;
                            let _ = reply_tx.send(Frame::Response { seq, result }).await;
                        });
                    }
                    None => {
                        tracing::warn!(method = %method, %peer, "unknown rpc method");
                        let resp = Frame::Response {
                            seq,
                            result: Err(format!("unknown method {method}")),
                        };
                        let _ = reply_tx.send(resp).await;
                    }
                },
                Frame::Response { seq, .. } => {
                    tracing::warn!(seq, %peer, "response frame on server connection, dropped");
                }
            }
        }

        drop(reply_tx);
        let _ = writer.await;
    }
}
