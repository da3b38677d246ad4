use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::FileInfo;

/// Build a [`FileInfo`] for `path` from its host metadata.
///
/// The descriptor path is made relative to `root` and always uses `/` as
/// the separator. A path that is not under `root` should never reach this
/// point; if it does, only its file name is reported.
pub fn to_file_info(root: &Path, path: &Path, metadata: &fs::Metadata) -> FileInfo {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => {
            warn!(
                root = %root.display(),
                path = %path.display(),
                "path is outside the root, reporting its file name only"
            );
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        }
    };

    FileInfo {
        path: relative,
        size: metadata.len(),
        modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        is_dir: metadata.is_dir(),
    }
}
