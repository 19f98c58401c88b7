use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Error, ErrorKind};
use tokio_util::codec::{Decoder, Encoder};
use tracing::error;

use super::frame::{
    Request, Response, ARG_LEN_SIZE, REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN,
};

/// Upper bound on arguments per request. Anything larger is a framing error,
/// not a legitimate command.
const MAX_ARGS: u32 = 1024;
/// Upper bound on a single argument, and on a response body.
const MAX_ARG_LEN: usize = 256 << 20;

#[derive(Debug, PartialEq)]
struct RequestHeader {
    version: u8,
    command: u8,
    argc: u32,
}

/// Decodes requests and encodes them again; the server reads with this codec
/// and the client writes with it. Frames carry no total length, so the
/// decoder keeps per-frame state between calls while arguments trickle in.
#[derive(Default)]
pub struct RequestCodec {
    header: Option<RequestHeader>,
    args: Vec<Bytes>,
    pending_arg_len: Option<usize>,
}

impl RequestCodec {
    pub fn new() -> RequestCodec {
        RequestCodec::default()
    }

    fn take_frame(&mut self) -> Request {
        let header = self.header.take().expect("frame header parsed");
        self.pending_arg_len = None;
        Request {
            version: header.version,
            command: header.command,
            args: std::mem::take(&mut self.args),
        }
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, io::Error> {
        if self.header.is_none() {
            if src.len() < REQUEST_HEADER_LEN {
                return Ok(None);
            }
            let version = src.get_u8();
            let command = src.get_u8();
            let argc = src.get_u32();
            if argc > MAX_ARGS {
                error!("request claims {} arguments, refusing to frame it", argc);
                return Err(Error::new(ErrorKind::InvalidData, "too many arguments"));
            }
            self.header = Some(RequestHeader {
                version,
                command,
                argc,
            });
            self.args = Vec::with_capacity(argc as usize);
        }

        let argc = self.header.as_ref().map(|header| header.argc).unwrap_or(0);
        while (self.args.len() as u32) < argc {
            let arg_len = match self.pending_arg_len {
                Some(len) => len,
                None => {
                    if src.len() < ARG_LEN_SIZE {
                        return Ok(None);
                    }
                    let len = src.get_u32() as usize;
                    if len > MAX_ARG_LEN {
                        error!("request argument of {} bytes, refusing to frame it", len);
                        return Err(Error::new(ErrorKind::InvalidData, "argument too large"));
                    }
                    self.pending_arg_len = Some(len);
                    len
                }
            };
            if src.len() < arg_len {
                return Ok(None);
            }
            self.args.push(src.split_to(arg_len).freeze());
            self.pending_arg_len = None;
        }

        Ok(Some(self.take_frame()))
    }
}

impl Encoder<Request> for RequestCodec {
    type Error = io::Error;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), io::Error> {
        let body_len: usize = request
            .args
            .iter()
            .map(|arg| ARG_LEN_SIZE + arg.len())
            .sum();
        dst.reserve(REQUEST_HEADER_LEN + body_len);

        dst.put_u8(request.version);
        dst.put_u8(request.command);
        dst.put_u32(request.args.len() as u32);
        for arg in &request.args {
            dst.put_u32(arg.len() as u32);
            dst.put_slice(arg);
        }
        Ok(())
    }
}

/// The response-side counterpart: the client decodes with this codec and the
/// server encodes with it.
#[derive(Default)]
pub struct ResponseCodec {
    header: Option<(u8, u8, usize)>,
}

impl ResponseCodec {
    pub fn new() -> ResponseCodec {
        ResponseCodec::default()
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, io::Error> {
        if self.header.is_none() {
            if src.len() < RESPONSE_HEADER_LEN {
                return Ok(None);
            }
            let version = src.get_u8();
            let reply = src.get_u8();
            let body_len = src.get_u32() as usize;
            if body_len > MAX_ARG_LEN {
                error!("response body of {} bytes, refusing to frame it", body_len);
                return Err(Error::new(ErrorKind::InvalidData, "body too large"));
            }
            self.header = Some((version, reply, body_len));
        }

        let (version, reply, body_len) = self.header.expect("frame header parsed");
        if src.len() < body_len {
            return Ok(None);
        }
        self.header = None;
        Ok(Some(Response {
            version,
            reply,
            body: src.split_to(body_len).freeze(),
        }))
    }
}

impl Encoder<Response> for ResponseCodec {
    type Error = io::Error;

    fn encode(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(RESPONSE_HEADER_LEN + response.body.len());
        dst.put_u8(response.version);
        dst.put_u8(response.reply);
        dst.put_u32(response.body.len() as u32);
        dst.put_slice(&response.body);
        Ok(())
    }
}
