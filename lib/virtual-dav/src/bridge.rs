//! Calling a [`DavHandler`] in-process, without a socket.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use http::method::InvalidMethod;
use http::uri::InvalidUri;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Builder;
use crate::dav::{DavHandler, ResponseWriter};

/// Reasons a call could not be turned into a request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("invalid method \"{method}\"")]
    Method {
        #[source]
        error: InvalidMethod,
        method: String,
    },
    #[error("invalid request path \"{path}\": {error}")]
    Uri {
        #[source]
        error: InvalidUri,
        path: String,
    },
    #[error("invalid header name \"{name}\"")]
    HeaderName {
        #[source]
        error: InvalidHeaderName,
        name: String,
    },
    #[error("invalid value for header \"{name}\"")]
    HeaderValue {
        #[source]
        error: InvalidHeaderValue,
        name: String,
    },
    #[error(transparent)]
    Http(#[from] http::Error),
}

/// What the host gets back from a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    /// Header names in canonical form (`Content-Type`), repeated values
    /// joined with `", "`.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn internal_error(message: impl fmt::Display) -> Self {
        HttpResponse {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )]),
            body: message.to_string().into_bytes(),
        }
    }
}

/// An in-memory [`ResponseWriter`].
///
/// The status starts out as `200 OK`. It can be changed until the first
/// body write, after which [`ResponseWriter::write_header`] is ignored.
#[derive(Debug)]
pub struct ResponseRecorder {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    body_written: bool,
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseRecorder {
    pub fn new() -> Self {
        ResponseRecorder {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            body_written: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status_code: self.status.as_u16(),
            headers: flatten_headers(&self.headers),
            body: self.body,
        }
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body_written = true;
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.body_written {
            debug!(%status, current = %self.status, "ignoring status set after the body");
            return;
        }
        self.status = status;
    }
}

/// Flatten a header map into one string per name.
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            (canonical_header_name(name.as_str()), joined)
        })
        .collect()
}

/// `content-type` becomes `Content-Type`.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Serves WebDAV requests handed over as plain values.
///
/// Every call builds a fresh request and response; nothing is kept between
/// calls, so a [`DavServer`] can be cloned and used from many threads at
/// once.
///
/// ```rust,no_run
/// # use std::collections::HashMap;
/// # use virtual_dav::{dav::Handler, host_fs, DavServer};
/// # fn main() -> Result<(), virtual_dav::FsError> {
/// let fs = host_fs::FileSystem::new("/srv/files")?;
/// let server = DavServer::new(Handler::new(fs));
///
/// let headers = HashMap::from([("Depth".to_string(), "1".to_string())]);
/// let response = server.handle_http_request("PROPFIND", "/", &headers, &[]);
/// assert_eq!(response.status_code, 207);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DavServer {
    handler: Arc<dyn DavHandler>,
}

impl fmt::Debug for DavServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavServer").finish_non_exhaustive()
    }
}

impl DavServer {
    pub fn new(handler: impl DavHandler + 'static) -> Self {
        DavServer {
            handler: Arc::new(handler),
        }
    }

    /// Create a [`Builder`] that can be used to configure a [`DavServer`].
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Handle a single request and return the captured response.
    ///
    /// Never fails: a request that cannot be built, or a handler that
    /// panics, is reported as a `500` response whose body is the error text.
    pub fn handle_http_request(
        &self,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> HttpResponse {
        self.handle_http_request_with_cancellation(
            CancellationToken::new(),
            method,
            path,
            headers,
            body,
        )
    }

    /// Like [`DavServer::handle_http_request`], with a token the filesystem
    /// checks before each blocking operation.
    #[tracing::instrument(level = "debug", skip(self, cancel, headers, body), fields(body_len = body.len()))]
    pub fn handle_http_request_with_cancellation(
        &self,
        cancel: CancellationToken,
        method: &str,
        path: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> HttpResponse {
        let request = match build_request(cancel, method, path, headers, body) {
            Ok(request) => request,
            Err(error) => {
                debug!(%error, "rejecting malformed request");
                return HttpResponse::internal_error(error);
            }
        };

        let mut recorder = ResponseRecorder::new();
        let served = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.serve(request, &mut recorder)
        }));
        if served.is_err() {
            warn!("handler panicked while serving the request");
            return HttpResponse::internal_error("internal error");
        }

        let response = recorder.into_response();
        debug!(status = response.status_code, "request handled");
        response
    }
}

fn build_request(
    cancel: CancellationToken,
    method: &str,
    path: &str,
    headers: &HashMap<String, String>,
    body: &[u8],
) -> Result<Request<Bytes>, BridgeError> {
    let method = Method::from_bytes(method.as_bytes()).map_err(|error| BridgeError::Method {
        error,
        method: method.to_string(),
    })?;

    let uri = if path.starts_with('/') || path.contains("://") {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let uri = uri.parse::<Uri>().map_err(|error| BridgeError::Uri {
        error,
        path: path.to_string(),
    })?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::copy_from_slice(body))?;

    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|error| BridgeError::HeaderName {
                error,
                name: name.clone(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|error| BridgeError::HeaderValue {
                error,
                name: name.clone(),
            })?;
        request.headers_mut().insert(header_name, header_value);
    }

    request.extensions_mut().insert(cancel);
    Ok(request)
}
