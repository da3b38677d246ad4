use std::path::{Path, PathBuf};

/// Map a `/`-separated protocol path onto a host path beneath `root`.
///
/// The protocol path is cleaned as if it were rooted at `/` before it is
/// joined, so `..` segments collapse against that synthetic root and can
/// never climb above `root`. Nothing is checked against the disk.
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for segment in clean_segments(path) {
        resolved.push(segment);
    }
    resolved
}

fn clean_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();

    for segment in path.split(is_separator) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            // a drive prefix would make `push` replace the whole path
            #[cfg(windows)]
            segment if segment.contains(':') => {}
            segment => segments.push(segment),
        }
    }

    segments
}

#[cfg(not(windows))]
fn is_separator(c: char) -> bool {
    c == '/'
}

#[cfg(windows)]
fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}
