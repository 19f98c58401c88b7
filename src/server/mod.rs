pub mod http;
pub mod options;
pub mod tcp;

use bytes::Bytes;
use thiserror::Error;

use crate::cache::CacheError;
use crate::cluster::ClusterError;
use crate::protocol::frame::Response;

/// Failures a command handler can report. Everything except `Redirect` turns
/// into an error reply whose body is the display string; several of those
/// strings are fixed by the wire contract.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("command needs more arguments")]
    MoreArguments,

    #[error("failed to find a handler of command")]
    HandlerNotFound,

    #[error("protocol version between client and server doesn't match")]
    VersionMismatch,

    #[error("invalid ttl argument")]
    InvalidTtl,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("{0}")]
    Internal(String),

    /// Not an error message: the key belongs to another node, named here.
    #[error("redirect to {0}")]
    Redirect(String),
}

pub type HandlerResult = std::result::Result<Bytes, HandlerError>;

/// Maps a handler outcome onto the wire. Redirects get their reserved reply
/// byte; every other failure becomes an error reply.
pub(crate) fn response_for(result: HandlerResult) -> Response {
    match result {
        Ok(body) => Response::success(body),
        Err(HandlerError::Redirect(owner)) => Response::redirect(&owner),
        Err(err) => Response::error(&err.to_string()),
    }
}
