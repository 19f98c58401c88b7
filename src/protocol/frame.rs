use bytes::Bytes;

// Request:
// version    command    argc        { arglen    arg }*argc
//  1 byte     1 byte    4 bytes      4 bytes   arglen bytes
//
// Response:
// version    reply    bodylen     body
//  1 byte    1 byte   4 bytes     bodylen bytes
//
// All lengths are big-endian.

/// Version byte both peers must agree on.
pub const PROTOCOL_VERSION: u8 = 1;

pub const SUCCESS_REPLY: u8 = 0;
pub const ERROR_REPLY: u8 = 1;
/// Reply sent by a non-owner: the body carries the owning node's address.
pub const REDIRECT_REPLY: u8 = 2;

pub const GET_COMMAND: u8 = 1;
pub const SET_COMMAND: u8 = 2;
pub const DELETE_COMMAND: u8 = 3;
pub const STATUS_COMMAND: u8 = 4;

pub(crate) const REQUEST_HEADER_LEN: usize = 6;
pub(crate) const RESPONSE_HEADER_LEN: usize = 6;
pub(crate) const ARG_LEN_SIZE: usize = 4;

/// One framed client request. The version byte is carried through so the
/// server can answer a mismatch instead of dropping the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub version: u8,
    pub command: u8,
    pub args: Vec<Bytes>,
}

impl Request {
    pub fn new(command: u8, args: Vec<Bytes>) -> Request {
        Request {
            version: PROTOCOL_VERSION,
            command,
            args,
        }
    }
}

/// One framed server response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub version: u8,
    pub reply: u8,
    pub body: Bytes,
}

impl Response {
    pub fn success(body: Bytes) -> Response {
        Response {
            version: PROTOCOL_VERSION,
            reply: SUCCESS_REPLY,
            body,
        }
    }

    pub fn error(message: &str) -> Response {
        Response {
            version: PROTOCOL_VERSION,
            reply: ERROR_REPLY,
            body: Bytes::copy_from_slice(message.as_bytes()),
        }
    }

    pub fn redirect(owner: &str) -> Response {
        Response {
            version: PROTOCOL_VERSION,
            reply: REDIRECT_REPLY,
            body: Bytes::copy_from_slice(owner.as_bytes()),
        }
    }
}
