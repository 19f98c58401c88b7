use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::io;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::cache::Status;
use crate::protocol::codec::{RequestCodec, ResponseCodec};
use crate::protocol::frame::{
    Request, DELETE_COMMAND, GET_COMMAND, PROTOCOL_VERSION, REDIRECT_REPLY, SET_COMMAND,
    STATUS_COMMAND, SUCCESS_REPLY,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The server answered with an error reply; the message is its body.
    #[error("{0}")]
    Server(String),

    /// The key lives on another node; retry there.
    #[error("redirected to {0}")]
    Redirected(String),

    #[error("protocol version between client and server doesn't match")]
    VersionMismatch,

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("malformed response body: {0}")]
    BadBody(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for the binary protocol, one request in flight at a time over a
/// single connection.
pub struct Client {
    reader: FramedRead<OwnedReadHalf, ResponseCodec>,
    writer: FramedWrite<OwnedWriteHalf, RequestCodec>,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Client> {
        let socket = TcpStream::connect(addr).await?;
        let (rx, tx) = socket.into_split();
        Ok(Client {
            reader: FramedRead::new(rx, ResponseCodec::new()),
            writer: FramedWrite::new(tx, RequestCodec::new()),
        })
    }

    pub async fn get(&mut self, key: &[u8]) -> Result<Bytes> {
        self.call(GET_COMMAND, vec![Bytes::copy_from_slice(key)])
            .await
    }

    pub async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, 0).await
    }

    pub async fn set_with_ttl(&mut self, key: &[u8], value: &[u8], ttl: u64) -> Result<()> {
        self.call(
            SET_COMMAND,
            vec![
                Bytes::copy_from_slice(&ttl.to_be_bytes()),
                Bytes::copy_from_slice(key),
                Bytes::copy_from_slice(value),
            ],
        )
        .await
        .map(|_| ())
    }

    pub async fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.call(DELETE_COMMAND, vec![Bytes::copy_from_slice(key)])
            .await
            .map(|_| ())
    }

    pub async fn status(&mut self) -> Result<Status> {
        let body = self.call(STATUS_COMMAND, Vec::new()).await?;
        serde_json::from_slice(&body).map_err(|err| ClientError::BadBody(err.to_string()))
    }

    /// Raw command round trip; the building block of the typed calls above.
    pub async fn call(&mut self, command: u8, args: Vec<Bytes>) -> Result<Bytes> {
        self.writer.send(Request::new(command, args)).await?;
        let response = match self.reader.next().await {
            None => return Err(ClientError::ConnectionClosed),
            Some(framed) => framed?,
        };
        if response.version != PROTOCOL_VERSION {
            return Err(ClientError::VersionMismatch);
        }
        match response.reply {
            SUCCESS_REPLY => Ok(response.body),
            REDIRECT_REPLY => Err(ClientError::Redirected(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
            _ => Err(ClientError::Server(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
        }
    }
}
