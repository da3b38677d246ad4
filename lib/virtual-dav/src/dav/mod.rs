//! The WebDAV side of the bridge.
//!
//! [`DavHandler`] is the seam a protocol implementation plugs into: it gets
//! one fully buffered [`http::Request`] and writes its answer to a
//! [`ResponseWriter`]. [`Handler`] is a small implementation covering the
//! class 1 methods on top of any [`crate::FileSystem`].

use std::io;

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};

mod handler;
mod multistatus;

pub use handler::Handler;

/// The output side of a single request.
///
/// Body bytes go through [`io::Write`]. The status defaults to `200 OK` and
/// can only be changed before the first body write.
pub trait ResponseWriter: io::Write {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);
}

/// A protocol implementation that serves requests synchronously.
///
/// Errors are the handler's own business: it is expected to turn them into
/// a status code on the [`ResponseWriter`].
pub trait DavHandler: Send + Sync {
    fn serve(&self, request: Request<Bytes>, response: &mut dyn ResponseWriter);
}
