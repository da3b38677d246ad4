use std::io;

use bytes::Bytes;
use http::{header, HeaderValue, Request, StatusCode, Uri};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::multistatus::{self, http_date};
use super::{DavHandler, ResponseWriter};
use crate::{CopyOptions, CreateOptions, FileSystem, FsError, MoveOptions, RemoveAllOptions};

const ALLOW: &str = "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE, PROPFIND";

/// A WebDAV class 1 handler (no locking) serving a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct Handler<F> {
    fs: F,
}

impl<F: FileSystem> Handler<F> {
    pub fn new(fs: F) -> Self {
        Handler { fs }
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }
}

/// A request that failed, along with the status it should be answered with.
#[derive(Debug, Error)]
#[error("{message}")]
struct DavError {
    status: StatusCode,
    message: String,
}

impl DavError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        DavError {
            status,
            message: message.into(),
        }
    }
}

impl From<FsError> for DavError {
    fn from(error: FsError) -> Self {
        DavError::new(status_for(error), error.to_string())
    }
}

impl From<io::Error> for DavError {
    fn from(error: io::Error) -> Self {
        DavError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }
}

fn status_for(error: FsError) -> StatusCode {
    match error {
        FsError::EntryNotFound => StatusCode::NOT_FOUND,
        FsError::AlreadyExists | FsError::IsADirectory => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotADirectory => StatusCode::CONFLICT,
        FsError::PermissionDenied | FsError::InvalidInput => StatusCode::FORBIDDEN,
        FsError::Unsupported => StatusCode::NOT_IMPLEMENTED,
        FsError::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type DavResult = Result<(), DavError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Zero,
    One,
    Infinity,
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    Copy,
    Move,
}

impl<F: FileSystem> DavHandler for Handler<F> {
    fn serve(&self, request: Request<Bytes>, response: &mut dyn ResponseWriter) {
        let cancel = request
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();
        let method = request.method().clone();

        let result = request_path(request.uri())
            .and_then(|path| self.dispatch(&cancel, &path, &request, response));

        if let Err(error) = result {
            debug!(%method, status = %error.status, %error, "request failed");
            write_error(response, &error);
        }
    }
}

impl<F: FileSystem> Handler<F> {
    fn dispatch(
        &self,
        cancel: &CancellationToken,
        path: &str,
        request: &Request<Bytes>,
        response: &mut dyn ResponseWriter,
    ) -> DavResult {
        let method = request.method();
        trace!(%method, path, "serving request");

        match method.as_str() {
            "OPTIONS" => self.options(response),
            "GET" => self.get(cancel, path, response, true),
            "HEAD" => self.get(cancel, path, response, false),
            "PUT" => self.put(cancel, path, request.body(), response),
            "DELETE" => self.delete(cancel, path, response),
            "MKCOL" => self.mkcol(cancel, path, request.body(), response),
            "COPY" => self.transfer(cancel, path, request, response, Transfer::Copy),
            "MOVE" => self.transfer(cancel, path, request, response, Transfer::Move),
            "PROPFIND" => self.propfind(cancel, path, request, response),
            _ => {
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(ALLOW));
                Err(DavError::new(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("method {method} is not supported"),
                ))
            }
        }
    }

    fn options(&self, response: &mut dyn ResponseWriter) -> DavResult {
        let headers = response.headers_mut();
        headers.insert(header::ALLOW, HeaderValue::from_static(ALLOW));
        headers.insert("dav", HeaderValue::from_static("1"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        response.write_header(StatusCode::OK);
        Ok(())
    }

    fn get(
        &self,
        cancel: &CancellationToken,
        path: &str,
        response: &mut dyn ResponseWriter,
        with_body: bool,
    ) -> DavResult {
        let info = self.fs.stat(cancel, path)?;
        if info.is_dir {
            return Err(DavError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "cannot read a collection",
            ));
        }
        let mut file = self.fs.open(cancel, path)?;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(header::LAST_MODIFIED, date_header(&info)?);
        response.write_header(StatusCode::OK);

        if with_body {
            io::copy(&mut file, response)?;
        }
        Ok(())
    }

    fn put(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &Bytes,
        response: &mut dyn ResponseWriter,
    ) -> DavResult {
        if path.trim_matches('/').is_empty() {
            return Err(DavError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "cannot write to the root collection",
            ));
        }

        let (_, created) = self
            .fs
            .create(cancel, path, &mut &body[..], &CreateOptions::default())
            .map_err(|error| match error {
                FsError::EntryNotFound => {
                    DavError::new(StatusCode::CONFLICT, "parent collection does not exist")
                }
                other => other.into(),
            })?;

        response.write_header(if created {
            StatusCode::CREATED
        } else {
            StatusCode::NO_CONTENT
        });
        Ok(())
    }

    fn delete(
        &self,
        cancel: &CancellationToken,
        path: &str,
        response: &mut dyn ResponseWriter,
    ) -> DavResult {
        // removal itself ignores missing paths, DELETE does not. A dangling
        // symlink still exists and can be deleted.
        self.fs.symlink_stat(cancel, path)?;
        self.fs
            .remove_all(cancel, path, &RemoveAllOptions::default())?;
        response.write_header(StatusCode::NO_CONTENT);
        Ok(())
    }

    fn mkcol(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &Bytes,
        response: &mut dyn ResponseWriter,
    ) -> DavResult {
        if !body.is_empty() {
            return Err(DavError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "MKCOL does not accept a request body",
            ));
        }

        self.fs.mkdir(cancel, path)?;
        response.write_header(StatusCode::CREATED);
        Ok(())
    }

    fn transfer(
        &self,
        cancel: &CancellationToken,
        path: &str,
        request: &Request<Bytes>,
        response: &mut dyn ResponseWriter,
        kind: Transfer,
    ) -> DavResult {
        let destination = destination(request)?;
        let no_overwrite = request
            .headers()
            .get("overwrite")
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"F"));

        let result = match kind {
            Transfer::Copy => {
                self.fs
                    .copy(cancel, path, &destination, &CopyOptions { no_overwrite })
            }
            Transfer::Move => {
                self.fs
                    .rename(cancel, path, &destination, &MoveOptions { no_overwrite })
            }
        };

        let created = result.map_err(|error| match error {
            FsError::AlreadyExists => DavError::new(
                StatusCode::PRECONDITION_FAILED,
                "destination exists and overwriting was not allowed",
            ),
            FsError::EntryNotFound if self.fs.symlink_stat(cancel, path).is_ok() => {
                DavError::new(
                    StatusCode::CONFLICT,
                    "destination parent collection does not exist",
                )
            }
            other => other.into(),
        })?;

        response.write_header(if created {
            StatusCode::CREATED
        } else {
            StatusCode::NO_CONTENT
        });
        Ok(())
    }

    fn propfind(
        &self,
        cancel: &CancellationToken,
        path: &str,
        request: &Request<Bytes>,
        response: &mut dyn ResponseWriter,
    ) -> DavResult {
        let depth = match request
            .headers()
            .get("depth")
            .map(|value| value.to_str().unwrap_or_default())
        {
            Some("0") => Depth::Zero,
            Some("1") => Depth::One,
            Some("infinity") | None => Depth::Infinity,
            Some(other) => {
                return Err(DavError::new(
                    StatusCode::BAD_REQUEST,
                    format!("invalid Depth header \"{other}\""),
                ))
            }
        };

        let info = self.fs.stat(cancel, path)?;
        let is_dir = info.is_dir;
        let mut entries = vec![info];
        if is_dir && depth != Depth::Zero {
            entries.extend(self.fs.read_dir(cancel, path, depth == Depth::Infinity)?);
        }

        let body = multistatus::render(&entries);
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=utf-8"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        response.write_header(StatusCode::MULTI_STATUS);
        response.write_all(body.as_bytes())?;
        Ok(())
    }
}

/// The decoded path of a request URI.
fn request_path(uri: &Uri) -> Result<String, DavError> {
    urlencoding::decode(uri.path())
        .map(|path| path.into_owned())
        .map_err(|_| DavError::new(StatusCode::BAD_REQUEST, "request path is not valid UTF-8"))
}

/// The target path of a COPY or MOVE, from an absolute URL or a plain path.
fn destination(request: &Request<Bytes>) -> Result<String, DavError> {
    let value = request
        .headers()
        .get("destination")
        .ok_or_else(|| DavError::new(StatusCode::BAD_REQUEST, "missing Destination header"))?;

    let uri = value
        .to_str()
        .ok()
        .and_then(|value| value.parse::<Uri>().ok())
        .ok_or_else(|| DavError::new(StatusCode::BAD_REQUEST, "invalid Destination header"))?;

    request_path(&uri)
}

fn date_header(info: &crate::FileInfo) -> Result<HeaderValue, DavError> {
    HeaderValue::try_from(http_date(info.modified))
        .map_err(|error| DavError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
}

fn write_error(response: &mut dyn ResponseWriter, error: &DavError) {
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.write_header(error.status);
    if let Err(write_error) = response.write_all(error.message.as_bytes()) {
        debug!(%write_error, "unable to write the error body");
    }
}
