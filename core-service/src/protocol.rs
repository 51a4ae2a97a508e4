//! # Worker Message Protocol
//!
//! Every request carries a type tag, and the worker answers with exactly one
//! response bearing the same tag. Requests are wrapped in an [`Envelope`]
//! with a [`RequestId`] so that several requests, including several of the
//! same type, can be in flight at once without their replies crossing.

use std::fmt;

use bridge_traits::{CptvFrame, CptvHeader};
use bytes::Bytes;
use core_decoder::{CptvMetadata, DecodeError};

/// Correlates a response with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Used by the unsolicited acknowledgement a worker posts on start.
    pub const INIT: RequestId = RequestId(0);
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Envelope<M> {
    pub id: RequestId,
    pub message: M,
}

#[derive(Debug, Clone)]
pub enum Request {
    InitWithUrl { url: String },
    InitWithUrlAndSize { url: String, size: Option<u64> },
    InitWithLocalCptvFile { bytes: Bytes, file_name: String },
    GetBytesMetadata { bytes: Bytes, file_name: String },
    GetStreamMetadata { url: String },
    GetHeader,
    GetNextFrame,
    GetTotalFrames,
    CountTotalFrames,
    GetMetadata,
    GetLoadProgress,
    HasStreamError,
    GetStreamError,
    FreeResources,
    /// A tag the worker does not understand; it is echoed back.
    Other(String),
}

impl Request {
    pub fn tag(&self) -> &str {
        match self {
            Request::InitWithUrl { .. } => "initWithUrl",
            Request::InitWithUrlAndSize { .. } => "initWithUrlAndSize",
            Request::InitWithLocalCptvFile { .. } => "initWithLocalCptvFile",
            Request::GetBytesMetadata { .. } => "getBytesMetadata",
            Request::GetStreamMetadata { .. } => "getStreamMetadata",
            Request::GetHeader => "getHeader",
            Request::GetNextFrame => "getNextFrame",
            Request::GetTotalFrames => "getTotalFrames",
            Request::CountTotalFrames => "countTotalFrames",
            Request::GetMetadata => "getMetadata",
            Request::GetLoadProgress => "getLoadProgress",
            Request::HasStreamError => "hasStreamError",
            Request::GetStreamError => "getStreamError",
            Request::FreeResources => "freeResources",
            Request::Other(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Posted once by a freshly started worker.
    Init,
    InitWithUrl(Result<(), DecodeError>),
    InitWithUrlAndSize(Result<(), DecodeError>),
    InitWithLocalCptvFile(Result<(), DecodeError>),
    GetBytesMetadata(Result<CptvMetadata, DecodeError>),
    GetStreamMetadata(Result<CptvMetadata, DecodeError>),
    GetHeader(Result<CptvHeader, DecodeError>),
    GetNextFrame(Result<Option<CptvFrame>, DecodeError>),
    GetTotalFrames(Option<u32>),
    CountTotalFrames(Result<u32, DecodeError>),
    GetMetadata(Result<CptvMetadata, DecodeError>),
    GetLoadProgress(Option<f64>),
    HasStreamError(bool),
    GetStreamError(Option<DecodeError>),
    FreeResources,
    Unsupported(String),
}

impl Response {
    pub fn tag(&self) -> &str {
        match self {
            Response::Init => "init",
            Response::InitWithUrl(_) => "initWithUrl",
            Response::InitWithUrlAndSize(_) => "initWithUrlAndSize",
            Response::InitWithLocalCptvFile(_) => "initWithLocalCptvFile",
            Response::GetBytesMetadata(_) => "getBytesMetadata",
            Response::GetStreamMetadata(_) => "getStreamMetadata",
            Response::GetHeader(_) => "getHeader",
            Response::GetNextFrame(_) => "getNextFrame",
            Response::GetTotalFrames(_) => "getTotalFrames",
            Response::CountTotalFrames(_) => "countTotalFrames",
            Response::GetMetadata(_) => "getMetadata",
            Response::GetLoadProgress(_) => "getLoadProgress",
            Response::HasStreamError(_) => "hasStreamError",
            Response::GetStreamError(_) => "getStreamError",
            Response::FreeResources => "freeResources",
            Response::Unsupported(tag) => tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_request_tag_has_a_matching_response() {
        let pairs = [
            (
                Request::InitWithUrlAndSize {
                    url: "https://h/a.cptv".into(),
                    size: Some(10),
                },
                Response::InitWithUrlAndSize(Ok(())),
            ),
            (
                Request::InitWithLocalCptvFile {
                    bytes: Bytes::new(),
                    file_name: "a.cptv".into(),
                },
                Response::InitWithLocalCptvFile(Err(DecodeError::NotInitialized)),
            ),
            (Request::GetNextFrame, Response::GetNextFrame(Ok(None))),
            (Request::GetTotalFrames, Response::GetTotalFrames(None)),
            (Request::FreeResources, Response::FreeResources),
        ];

        for (request, response) in pairs {
            assert_eq!(request.tag(), response.tag());
        }
    }

    #[test]
    fn test_unknown_tags_echo() {
        let request = Request::Other("ping".into());
        let response = Response::Unsupported("ping".into());
        assert_eq!(request.tag(), "ping");
        assert_eq!(response.tag(), request.tag());
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId(42).to_string(), "#42");
        assert_eq!(RequestId::INIT, RequestId(0));
    }
}
