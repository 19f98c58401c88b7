use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use super::{response_for, HandlerError, HandlerResult};
use crate::cache::{Cache, CacheError};
use crate::cluster::ClusterNode;
use crate::protocol::codec::{RequestCodec, ResponseCodec};
use crate::protocol::frame::{
    DELETE_COMMAND, GET_COMMAND, PROTOCOL_VERSION, SET_COMMAND, STATUS_COMMAND,
};

type BoxedHandler = Box<dyn Fn(Vec<Bytes>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Generic binary-protocol server: a listener plus a table of handlers keyed
/// on the command byte. Knows nothing about the cache.
///
/// Each connection is served by its own task running the
/// read-dispatch-write loop until the peer hangs up or a read fails.
/// Shutdown stops the acceptor and then waits for the outstanding
/// connection tasks to drain.
pub struct BinaryServer {
    listener: TcpListener,
    handlers: HashMap<u8, BoxedHandler>,
    shutdown: CancellationToken,
}

impl BinaryServer {
    pub async fn bind(addr: &str, shutdown: CancellationToken) -> io::Result<BinaryServer> {
        let listener = TcpListener::bind(addr).await?;
        Ok(BinaryServer {
            listener,
            handlers: HashMap::new(),
            shutdown,
        })
    }

    pub fn register_handler(&mut self, command: u8, handler: BoxedHandler) {
        self.handlers.insert(command, handler);
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self) -> io::Result<()> {
        let handlers = Arc::new(self.handlers);
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                incoming = self.listener.accept() => match incoming {
                    Ok((socket, peer)) => {
                        let handlers = handlers.clone();
                        connections.spawn(handle_connection(socket, peer, handlers));
                    }
                    Err(err) => {
                        error!("accept failed: {}", err);
                    }
                },
            }
        }

        // In-flight requests finish before their connections are dropped.
        connections.close();
        connections.wait().await;
        Ok(())
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    handlers: Arc<HashMap<u8, BoxedHandler>>,
) {
    debug!("client connected: {}", peer);
    let (rx, tx) = socket.into_split();
    let mut reader = FramedRead::new(rx, RequestCodec::new());
    let mut writer = FramedWrite::new(tx, ResponseCodec::new());

    while let Some(framed) = reader.next().await {
        let request = match framed {
            Ok(request) => request,
            Err(err) => {
                error!("failed to decode request from {}: {}", peer, err);
                break;
            }
        };

        // A mismatched version byte is answered, not fatal: the codec has
        // consumed the whole frame, so the stream is still aligned.
        let result = if request.version != PROTOCOL_VERSION {
            Err(HandlerError::VersionMismatch)
        } else {
            match handlers.get(&request.command) {
                Some(handler) => handler(request.args).await,
                None => Err(HandlerError::HandlerNotFound),
            }
        };

        if let Err(err) = writer.send(response_for(result)).await {
            error!("failed to send response to {}: {}", peer, err);
            break;
        }
    }
    debug!("client disconnected: {}", peer);
}

/// Binds the four cache commands to a [`BinaryServer`], applying the cluster
/// ownership check before any key-addressed operation.
pub struct TcpCacheServer {
    server: BinaryServer,
}

impl TcpCacheServer {
    pub async fn bind(
        cache: Arc<Cache>,
        node: Arc<ClusterNode>,
        addr: &str,
        shutdown: CancellationToken,
    ) -> io::Result<TcpCacheServer> {
        let mut server = BinaryServer::bind(addr, shutdown).await?;
        let service = Arc::new(CacheService { cache, node });

        let get_service = service.clone();
        server.register_handler(
            GET_COMMAND,
            Box::new(move |args| {
                let service = get_service.clone();
                async move { service.get(args).await }.boxed()
            }),
        );
        let set_service = service.clone();
        server.register_handler(
            SET_COMMAND,
            Box::new(move |args| {
                let service = set_service.clone();
                async move { service.set(args).await }.boxed()
            }),
        );
        let delete_service = service.clone();
        server.register_handler(
            DELETE_COMMAND,
            Box::new(move |args| {
                let service = delete_service.clone();
                async move { service.delete(args).await }.boxed()
            }),
        );
        let status_service = service;
        server.register_handler(
            STATUS_COMMAND,
            Box::new(move |args| {
                let service = status_service.clone();
                async move { service.status(args).await }.boxed()
            }),
        );

        Ok(TcpCacheServer { server })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.server.local_addr()
    }

    pub async fn serve(self) -> io::Result<()> {
        self.server.serve().await
    }
}

struct CacheService {
    cache: Arc<Cache>,
    node: Arc<ClusterNode>,
}

impl CacheService {
    /// Ok when this node owns `key`; a redirect naming the owner otherwise.
    fn check_owner(&self, key: &[u8]) -> Result<(), HandlerError> {
        let owner = self.node.owner_of(key)?;
        if self.node.is_self(&owner) {
            Ok(())
        } else {
            Err(HandlerError::Redirect(owner))
        }
    }

    async fn get(&self, args: Vec<Bytes>) -> HandlerResult {
        let key = args.first().ok_or(HandlerError::MoreArguments)?;
        self.check_owner(key)?;
        match self.cache.get(key).await {
            Some(value) => Ok(value),
            None => Err(CacheError::NotFound.into()),
        }
    }

    async fn set(&self, args: Vec<Bytes>) -> HandlerResult {
        if args.len() < 3 {
            return Err(HandlerError::MoreArguments);
        }
        let ttl_raw: [u8; 8] = args[0]
            .as_ref()
            .try_into()
            .map_err(|_| HandlerError::InvalidTtl)?;
        let key = &args[1];
        self.check_owner(key)?;
        self.cache
            .set_with_ttl(key, &args[2], u64::from_be_bytes(ttl_raw))
            .await?;
        Ok(Bytes::new())
    }

    async fn delete(&self, args: Vec<Bytes>) -> HandlerResult {
        let key = args.first().ok_or(HandlerError::MoreArguments)?;
        self.check_owner(key)?;
        self.cache.delete(key).await;
        Ok(Bytes::new())
    }

    async fn status(&self, _args: Vec<Bytes>) -> HandlerResult {
        let status = self.cache.status().await;
        serde_json::to_vec(&status)
            .map(Bytes::from)
            .map_err(|err| HandlerError::Internal(err.to_string()))
    }
}
