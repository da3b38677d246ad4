//! Rendering of `207 Multi-Status` bodies for PROPFIND.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::FileInfo;

/// Format a timestamp the way HTTP headers and `getlastmodified` expect it.
pub(crate) fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// The percent-encoded href of an entry. Collections end with a `/`.
pub(crate) fn href(info: &FileInfo) -> String {
    let encoded = info
        .path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");

    let mut href = format!("/{encoded}");
    if info.is_dir && !encoded.is_empty() {
        href.push('/');
    }
    href
}

pub(crate) fn render(entries: &[FileInfo]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(r#"<D:multistatus xmlns:D="DAV:">"#);

    for info in entries {
        xml.push_str("<D:response>");
        // hrefs are percent-encoded, so they never need XML escaping
        xml.push_str(&format!("<D:href>{}</D:href>", href(info)));
        xml.push_str("<D:propstat><D:prop>");
        if info.is_dir {
            xml.push_str("<D:resourcetype><D:collection/></D:resourcetype>");
        } else {
            xml.push_str("<D:resourcetype/>");
            xml.push_str(&format!(
                "<D:getcontentlength>{}</D:getcontentlength>",
                info.size
            ));
        }
        xml.push_str(&format!(
            "<D:getlastmodified>{}</D:getlastmodified>",
            http_date(info.modified)
        ));
        xml.push_str("</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>");
        xml.push_str("</D:response>");
    }

    xml.push_str("</D:multistatus>");
    xml
}
