//! A [`crate::FileSystem`] backed by a directory on the host.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    resolve, to_file_info, CopyOptions, CreateOptions, FileInfo, FsError, MoveOptions,
    RemoveAllOptions, Result,
};

/// Local filesystem access confined to a root directory.
///
/// The root is canonicalized once when the filesystem is created and never
/// changes afterwards, so a single instance can be shared freely between
/// threads.
#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
}

pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(FsError::InvalidInput);
    }
    dunce::canonicalize(path).map_err(Into::into)
}

impl FileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = canonicalize(&root.into())?;

        if !root.is_dir() {
            return Err(FsError::BaseNotDirectory);
        }

        Ok(FileSystem { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The host path a protocol path refers to.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.prepare_path(path)
    }

    fn prepare_path(&self, path: &str) -> PathBuf {
        let path = resolve(&self.root, path);
        debug_assert!(path.starts_with(&self.root));
        path
    }

    fn info(&self, path: &Path, metadata: &fs::Metadata) -> FileInfo {
        to_file_info(&self.root, path, metadata)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(FsError::Interrupted);
    }
    Ok(())
}

/// Converts a host error, keeping its message in the logs.
fn host_error<'a>(op: &'static str, path: &'a Path) -> impl Fn(io::Error) -> FsError + 'a {
    move |error| {
        debug!(op, path = %path.display(), %error, "host filesystem call failed");
        error.into()
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Remove a file, a symlink or a whole directory tree without following links.
fn remove_entry(path: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Make room for an overwriting copy or move.
///
/// A directory in the way is removed, as is anything in the way of a
/// directory. A file replacing a file is left to the host so the swap stays
/// atomic.
fn clear_destination(to: &Path, source_is_dir: bool, op: &'static str) -> Result<()> {
    let metadata = match fs::symlink_metadata(to) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(host_error(op, to)(error)),
    };

    if metadata.is_dir() || source_is_dir {
        remove_entry(to, &metadata).map_err(host_error(op, to))?;
        debug!(path = %to.display(), "removed overwritten destination");
    }
    Ok(())
}

impl crate::FileSystem for FileSystem {
    fn open(&self, cancel: &CancellationToken, path: &str) -> Result<Box<dyn Read + Send>> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        let file = fs::File::open(&path).map_err(host_error("open", &path))?;
        if file.metadata().map_err(host_error("open", &path))?.is_dir() {
            return Err(FsError::IsADirectory);
        }

        trace!(path = %path.display(), "opened file");
        Ok(Box::new(file))
    }

    fn stat(&self, cancel: &CancellationToken, path: &str) -> Result<FileInfo> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        let metadata = fs::metadata(&path).map_err(host_error("stat", &path))?;
        Ok(self.info(&path, &metadata))
    }

    fn symlink_stat(&self, cancel: &CancellationToken, path: &str) -> Result<FileInfo> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        let metadata = fs::symlink_metadata(&path).map_err(host_error("symlink_stat", &path))?;
        Ok(self.info(&path, &metadata))
    }

    fn read_dir(
        &self,
        cancel: &CancellationToken,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileInfo>> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        if !fs::metadata(&path)
            .map_err(host_error("read_dir", &path))?
            .is_dir()
        {
            return Err(FsError::NotADirectory);
        }

        let mut files = Vec::new();
        // One open iterator per directory level. A child directory's
        // iterator is pushed right after its entry is emitted, so its whole
        // subtree is listed before the next sibling.
        let mut stack = vec![fs::read_dir(&path).map_err(host_error("read_dir", &path))?];

        while let Some(entries) = stack.last_mut() {
            let Some(entry) = entries.next() else {
                stack.pop();
                continue;
            };

            let entry = entry.map_err(host_error("read_dir", &path))?;
            let entry_path = entry.path();
            // lstat semantics: symlinks are reported as themselves and never followed
            let metadata = entry
                .metadata()
                .map_err(host_error("read_dir", &entry_path))?;

            files.push(self.info(&entry_path, &metadata));

            if recursive && metadata.is_dir() {
                check_cancelled(cancel)?;
                stack.push(fs::read_dir(&entry_path).map_err(host_error("read_dir", &entry_path))?);
            }
        }

        trace!(path = %path.display(), recursive, count = files.len(), "listed directory");
        Ok(files)
    }

    fn create(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &mut dyn Read,
        options: &CreateOptions,
    ) -> Result<(FileInfo, bool)> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        let mut oo = fs::OpenOptions::new();
        oo.read(true).write(true);
        if options.no_overwrite {
            oo.create_new(true);
        } else {
            oo.create(true).truncate(true);
        }

        let mut file = oo.open(&path).map_err(host_error("create", &path))?;
        let written = io::copy(body, &mut file).map_err(host_error("create", &path))?;
        let metadata = file.metadata().map_err(host_error("create", &path))?;

        debug!(path = %path.display(), written, "wrote file");
        // the file is either new or truncated, both count as created
        Ok((self.info(&path, &metadata), true))
    }

    fn mkdir(&self, cancel: &CancellationToken, path: &str) -> Result<()> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        fs::create_dir_all(&path).map_err(host_error("mkdir", &path))?;
        debug!(path = %path.display(), "created directory");
        Ok(())
    }

    fn remove_all(
        &self,
        cancel: &CancellationToken,
        path: &str,
        _options: &RemoveAllOptions,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        let path = self.prepare_path(path);

        if path == self.root {
            return Err(FsError::InvalidInput);
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(host_error("remove_all", &path)(error)),
        };

        match remove_entry(&path, &metadata) {
            Ok(()) => {
                debug!(path = %path.display(), "removed");
                Ok(())
            }
            // someone else got there first
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(host_error("remove_all", &path)(error)),
        }
    }

    fn copy(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        options: &CopyOptions,
    ) -> Result<bool> {
        check_cancelled(cancel)?;
        let from = self.prepare_path(from);
        let to = self.prepare_path(to);

        let metadata = fs::metadata(&from).map_err(host_error("copy", &from))?;
        if metadata.is_dir() {
            return Err(FsError::Unsupported);
        }

        if options.no_overwrite && exists(&to) {
            return Err(FsError::AlreadyExists);
        }

        // copying a file onto itself would truncate it before reading, and
        // clearing an ancestor of the source would delete the source
        if from.starts_with(&to) {
            return Err(FsError::InvalidInput);
        }

        if !options.no_overwrite {
            clear_destination(&to, false, "copy")?;
        }

        let copied = fs::copy(&from, &to).map_err(host_error("copy", &to))?;
        debug!(from = %from.display(), to = %to.display(), copied, "copied file");
        Ok(true)
    }

    fn rename(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        options: &MoveOptions,
    ) -> Result<bool> {
        check_cancelled(cancel)?;
        let from = self.prepare_path(from);
        let to = self.prepare_path(to);

        if from == self.root || to == self.root {
            return Err(FsError::InvalidInput);
        }

        let metadata = fs::symlink_metadata(&from).map_err(host_error("rename", &from))?;

        // a tree cannot move into itself, and it cannot replace its own ancestor
        if to.starts_with(&from) || from.starts_with(&to) {
            return Err(FsError::InvalidInput);
        }

        if options.no_overwrite {
            if exists(&to) {
                return Err(FsError::AlreadyExists);
            }
        } else {
            clear_destination(&to, metadata.is_dir(), "rename")?;
        }

        match fs::rename(&from, &to) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "rename crosses devices, falling back to copy and delete"
                );
                move_across_devices(&from, &to, metadata.is_dir(), options)?;
            }
            Err(error) => return Err(host_error("rename", &from)(error)),
        }

        debug!(from = %from.display(), to = %to.display(), "moved");
        Ok(true)
    }
}

fn move_across_devices(from: &Path, to: &Path, is_dir: bool, options: &MoveOptions) -> Result<()> {
    if options.no_overwrite {
        if exists(to) {
            return Err(FsError::AlreadyExists);
        }
    } else {
        // a file in the way of a file is replaced by `fs::copy`
        clear_destination(to, is_dir, "rename")?;
    }

    if is_dir {
        fs_extra::dir::move_dir(
            from,
            to,
            &fs_extra::dir::CopyOptions {
                copy_inside: true,
                content_only: true,
                ..Default::default()
            },
        )
        .map(|_| ())
        .map_err(|error| {
            debug!(from = %from.display(), %error, "moving directory failed");
            FsError::IOError
        })
    } else {
        fs::copy(from, to).map_err(host_error("rename", to))?;
        fs::remove_file(from).map_err(host_error("rename", from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileSystem as _;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileSystem, CancellationToken) {
        let temp = TempDir::new().unwrap();
        let fs = FileSystem::new(temp.path()).expect("get filesystem");
        (temp, fs, CancellationToken::new())
    }

    fn write(fs: &FileSystem, cancel: &CancellationToken, path: &str, content: &str) -> FileInfo {
        let (info, created) = fs
            .create(cancel, path, &mut content.as_bytes(), &CreateOptions::default())
            .unwrap();
        assert!(created);
        info
    }

    fn read(fs: &FileSystem, cancel: &CancellationToken, path: &str) -> String {
        let mut content = String::new();
        fs.open(cancel, path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    fn sorted_paths(files: Vec<FileInfo>) -> Vec<String> {
        let mut paths: Vec<_> = files.into_iter().map(|info| info.path).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_new_filesystem() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        std::fs::write(&file, b"").unwrap();

        assert!(FileSystem::new(temp.path()).is_ok());
        assert_eq!(
            FileSystem::new(temp.path().join("missing")).unwrap_err(),
            FsError::InvalidInput,
            "a root that does not exist",
        );
        assert_eq!(
            FileSystem::new(&file).unwrap_err(),
            FsError::BaseNotDirectory,
            "a root that is a file",
        );
    }

    #[test]
    fn test_resolve_stays_inside_root() {
        let (_temp, fs, _) = setup();

        assert_eq!(fs.resolve(""), fs.root());
        assert_eq!(fs.resolve("/../../.."), fs.root());
        assert_eq!(fs.resolve("../a/../b"), fs.root().join("b"));
    }

    #[test]
    fn test_create_then_stat() {
        let (_temp, fs, cancel) = setup();

        fs.mkdir(&cancel, "/a").unwrap();
        let written = write(&fs, &cancel, "/a/b.txt", "hi");
        let info = fs.stat(&cancel, "/a/b.txt").unwrap();

        assert_eq!(info.path, "a/b.txt");
        assert_eq!(info.size, 2);
        assert!(!info.is_dir);
        assert_eq!(written, info);
    }

    #[test]
    fn test_create_truncates() {
        let (_temp, fs, cancel) = setup();

        write(&fs, &cancel, "/notes.txt", "a much longer first version");
        let info = write(&fs, &cancel, "/notes.txt", "short");

        assert_eq!(info.size, 5);
        assert_eq!(read(&fs, &cancel, "/notes.txt"), "short");
    }

    #[test]
    fn test_create_no_overwrite() {
        let (_temp, fs, cancel) = setup();
        write(&fs, &cancel, "/notes.txt", "first");

        let result = fs.create(
            &cancel,
            "/notes.txt",
            &mut &b"second"[..],
            &CreateOptions { no_overwrite: true },
        );

        assert_eq!(result.unwrap_err(), FsError::AlreadyExists);
        assert_eq!(read(&fs, &cancel, "/notes.txt"), "first");
    }

    #[test]
    fn test_create_without_parent() {
        let (_temp, fs, cancel) = setup();

        let result = fs.create(
            &cancel,
            "/missing/file.txt",
            &mut &b"x"[..],
            &CreateOptions::default(),
        );

        assert_eq!(result.unwrap_err(), FsError::EntryNotFound);
    }

    #[test]
    fn test_create_escaping_path_lands_in_root() {
        let (temp, fs, cancel) = setup();

        write(&fs, &cancel, "/../../escaped.txt", "x");

        assert!(temp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_open() {
        let (_temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/dir").unwrap();
        write(&fs, &cancel, "/dir/file.txt", "content");

        assert_eq!(read(&fs, &cancel, "/dir/file.txt"), "content");
        assert_eq!(
            fs.open(&cancel, "/dir/missing.txt").err(),
            Some(FsError::EntryNotFound),
            "opening a file that doesn't exist",
        );
        assert_eq!(
            fs.open(&cancel, "/dir").err(),
            Some(FsError::IsADirectory),
            "opening a directory",
        );
    }

    #[test]
    fn test_stat_missing() {
        let (_temp, fs, cancel) = setup();

        assert_eq!(fs.stat(&cancel, "/nope").unwrap_err(), FsError::EntryNotFound);
    }

    #[test]
    fn test_stat_root() {
        let (_temp, fs, cancel) = setup();

        let info = fs.stat(&cancel, "/").unwrap();

        assert_eq!(info.path, "");
        assert!(info.is_dir);
    }

    #[test]
    fn test_read_dir() {
        let (_temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/x/z").unwrap();
        write(&fs, &cancel, "/x/y.txt", "y");
        write(&fs, &cancel, "/x/z/w.txt", "w");

        let flat = fs.read_dir(&cancel, "/x", false).unwrap();
        assert_eq!(sorted_paths(flat), vec!["x/y.txt", "x/z"]);

        let all = fs.read_dir(&cancel, "/x", true).unwrap();
        assert_eq!(sorted_paths(all), vec!["x/y.txt", "x/z", "x/z/w.txt"]);
    }

    #[test]
    fn test_read_dir_recursive_is_depth_first() {
        let (_temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/a/b/c").unwrap();
        fs.mkdir(&cancel, "/d").unwrap();
        write(&fs, &cancel, "/a/b/c/leaf.txt", "");
        write(&fs, &cancel, "/a/b/side.txt", "");
        write(&fs, &cancel, "/d/other.txt", "");

        let files = fs.read_dir(&cancel, "/", true).unwrap();
        let paths: Vec<_> = files.iter().map(|info| info.path.as_str()).collect();

        // every entry is listed exactly once
        let mut unique = paths.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), paths.len());
        assert_eq!(paths.len(), 7);

        // a directory's descendants directly follow it
        for (index, info) in files.iter().enumerate().filter(|(_, info)| info.is_dir) {
            let prefix = format!("{}/", info.path);
            let descendants = paths.iter().filter(|p| p.starts_with(&prefix)).count();
            assert!(
                paths[index + 1..=index + descendants]
                    .iter()
                    .all(|p| p.starts_with(&prefix)),
                "children of {} are not contiguous in {paths:?}",
                info.path,
            );
        }
    }

    #[test]
    fn test_read_dir_errors() {
        let (_temp, fs, cancel) = setup();
        write(&fs, &cancel, "/file.txt", "");

        assert_eq!(
            fs.read_dir(&cancel, "/missing", false).unwrap_err(),
            FsError::EntryNotFound,
        );
        assert_eq!(
            fs.read_dir(&cancel, "/file.txt", true).unwrap_err(),
            FsError::NotADirectory,
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_read_dir_does_not_follow_symlink_loops() {
        let (temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/loop").unwrap();
        std::os::unix::fs::symlink(temp.path().join("loop"), temp.path().join("loop/self"))
            .unwrap();

        let files = fs.read_dir(&cancel, "/", true).unwrap();

        assert_eq!(sorted_paths(files), vec!["loop", "loop/self"]);
    }

    #[test]
    fn test_mkdir() {
        let (temp, fs, cancel) = setup();

        assert_eq!(fs.mkdir(&cancel, "/foo/bar"), Ok(()), "creating nested dirs");
        assert!(temp.path().join("foo/bar").is_dir());
        assert_eq!(fs.mkdir(&cancel, "/foo/bar"), Ok(()), "mkdir is idempotent");
        assert_eq!(fs.mkdir(&cancel, "/"), Ok(()), "the root already exists");

        write(&fs, &cancel, "/file", "");
        assert_eq!(
            fs.mkdir(&cancel, "/file"),
            Err(FsError::AlreadyExists),
            "a file is in the way",
        );
    }

    #[test]
    fn test_remove_all() {
        let (temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/foo/bar").unwrap();
        write(&fs, &cancel, "/foo/bar/baz.txt", "");
        write(&fs, &cancel, "/top.txt", "");
        let options = RemoveAllOptions::default();

        assert_eq!(fs.remove_all(&cancel, "/foo", &options), Ok(()));
        assert!(!temp.path().join("foo").exists());

        assert_eq!(fs.remove_all(&cancel, "/top.txt", &options), Ok(()));
        assert!(!temp.path().join("top.txt").exists());

        assert_eq!(
            fs.remove_all(&cancel, "/never-existed", &options),
            Ok(()),
            "removing a missing path",
        );
        assert_eq!(
            fs.remove_all(&cancel, "/", &options),
            Err(FsError::InvalidInput),
            "removing the root",
        );
        assert!(temp.path().exists());
    }

    #[test]
    fn test_copy() {
        let (_temp, fs, cancel) = setup();
        write(&fs, &cancel, "/src.txt", "source");
        write(&fs, &cancel, "/dst.txt", "destination");

        assert_eq!(
            fs.copy(&cancel, "/src.txt", "/dst.txt", &CopyOptions { no_overwrite: true }),
            Err(FsError::AlreadyExists),
        );
        assert_eq!(read(&fs, &cancel, "/dst.txt"), "destination");

        assert_eq!(
            fs.copy(&cancel, "/src.txt", "/dst.txt", &CopyOptions::default()),
            Ok(true),
        );
        assert_eq!(read(&fs, &cancel, "/dst.txt"), "source");

        assert_eq!(
            fs.copy(&cancel, "/src.txt", "/new.txt", &CopyOptions { no_overwrite: true }),
            Ok(true),
        );
        assert_eq!(read(&fs, &cancel, "/new.txt"), "source");
        assert_eq!(read(&fs, &cancel, "/src.txt"), "source");
    }

    #[test]
    fn test_copy_errors() {
        let (temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/dir").unwrap();
        write(&fs, &cancel, "/dir/inner.txt", "");
        write(&fs, &cancel, "/file.txt", "keep me");

        assert_eq!(
            fs.copy(&cancel, "/dir", "/dir-copy", &CopyOptions::default()),
            Err(FsError::Unsupported),
            "copying a directory",
        );
        assert!(!temp.path().join("dir-copy").exists());

        assert_eq!(
            fs.copy(&cancel, "/missing", "/other", &CopyOptions::default()),
            Err(FsError::EntryNotFound),
        );

        assert_eq!(
            fs.copy(&cancel, "/file.txt", "/file.txt", &CopyOptions::default()),
            Err(FsError::InvalidInput),
            "copying onto itself",
        );
        assert_eq!(read(&fs, &cancel, "/file.txt"), "keep me");
    }

    #[test]
    fn test_rename() {
        let (temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/foo/qux").unwrap();
        write(&fs, &cancel, "/foo/qux/hello.txt", "hello");
        write(&fs, &cancel, "/a.txt", "a");
        write(&fs, &cancel, "/b.txt", "b");

        assert_eq!(
            fs.rename(&cancel, "/foo", "/bar", &MoveOptions::default()),
            Ok(true),
            "moving a directory",
        );
        assert!(!temp.path().join("foo").exists());
        assert_eq!(read(&fs, &cancel, "/bar/qux/hello.txt"), "hello");

        assert_eq!(
            fs.rename(&cancel, "/a.txt", "/b.txt", &MoveOptions { no_overwrite: true }),
            Err(FsError::AlreadyExists),
        );
        assert_eq!(read(&fs, &cancel, "/a.txt"), "a");
        assert_eq!(read(&fs, &cancel, "/b.txt"), "b");

        assert_eq!(
            fs.rename(&cancel, "/a.txt", "/b.txt", &MoveOptions::default()),
            Ok(true),
        );
        assert!(!temp.path().join("a.txt").exists());
        assert_eq!(read(&fs, &cancel, "/b.txt"), "a");
    }

    #[test]
    fn test_rename_errors() {
        let (_temp, fs, cancel) = setup();
        write(&fs, &cancel, "/file.txt", "");

        assert_eq!(
            fs.rename(&cancel, "/missing", "/other", &MoveOptions::default()),
            Err(FsError::EntryNotFound),
        );
        assert_eq!(
            fs.rename(&cancel, "/", "/elsewhere", &MoveOptions::default()),
            Err(FsError::InvalidInput),
            "moving the root",
        );
        assert_eq!(
            fs.rename(&cancel, "/file.txt", "/..", &MoveOptions::default()),
            Err(FsError::InvalidInput),
            "moving onto the root",
        );
    }

    #[test]
    fn test_copy_replaces_a_directory() {
        let (temp, fs, cancel) = setup();
        write(&fs, &cancel, "/a.txt", "a");
        fs.mkdir(&cancel, "/empty").unwrap();
        fs.mkdir(&cancel, "/full").unwrap();
        write(&fs, &cancel, "/full/inner.txt", "inner");

        assert_eq!(
            fs.copy(&cancel, "/a.txt", "/empty", &CopyOptions::default()),
            Ok(true),
        );
        assert_eq!(read(&fs, &cancel, "/empty"), "a");

        assert_eq!(
            fs.copy(&cancel, "/a.txt", "/full", &CopyOptions { no_overwrite: true }),
            Err(FsError::AlreadyExists),
        );
        assert!(temp.path().join("full/inner.txt").exists());

        assert_eq!(
            fs.copy(&cancel, "/a.txt", "/full", &CopyOptions::default()),
            Ok(true),
        );
        assert_eq!(read(&fs, &cancel, "/full"), "a");
        assert_eq!(read(&fs, &cancel, "/a.txt"), "a");
    }

    #[test]
    fn test_rename_replaces_a_directory() {
        let (temp, fs, cancel) = setup();
        write(&fs, &cancel, "/a.txt", "a");
        fs.mkdir(&cancel, "/d").unwrap();
        fs.mkdir(&cancel, "/src/sub").unwrap();
        write(&fs, &cancel, "/src/sub/new.txt", "new");
        fs.mkdir(&cancel, "/dst").unwrap();
        write(&fs, &cancel, "/dst/old.txt", "old");

        assert_eq!(
            fs.rename(&cancel, "/a.txt", "/d", &MoveOptions::default()),
            Ok(true),
            "a file onto an empty directory",
        );
        assert_eq!(read(&fs, &cancel, "/d"), "a");
        assert!(!temp.path().join("a.txt").exists());

        assert_eq!(
            fs.rename(&cancel, "/src", "/dst", &MoveOptions::default()),
            Ok(true),
            "a directory onto a non-empty directory",
        );
        assert!(!temp.path().join("src").exists());
        assert!(!temp.path().join("dst/old.txt").exists());
        assert!(!temp.path().join("dst/src").exists());
        assert_eq!(read(&fs, &cancel, "/dst/sub/new.txt"), "new");

        write(&fs, &cancel, "/file.txt", "file");
        assert_eq!(
            fs.rename(&cancel, "/dst", "/file.txt", &MoveOptions::default()),
            Ok(true),
            "a directory onto a file",
        );
        assert_eq!(read(&fs, &cancel, "/file.txt/sub/new.txt"), "new");
    }

    #[test]
    fn test_rename_never_clears_its_own_tree() {
        let (temp, fs, cancel) = setup();
        fs.mkdir(&cancel, "/dir/sub").unwrap();
        write(&fs, &cancel, "/dir/sub/keep.txt", "keep");

        assert_eq!(
            fs.rename(&cancel, "/dir/sub", "/dir", &MoveOptions::default()),
            Err(FsError::InvalidInput),
            "replacing an ancestor",
        );
        assert_eq!(
            fs.rename(&cancel, "/dir", "/dir/sub/inner", &MoveOptions::default()),
            Err(FsError::InvalidInput),
            "moving into a descendant",
        );
        assert_eq!(
            fs.rename(&cancel, "/dir", "/dir", &MoveOptions::default()),
            Err(FsError::InvalidInput),
            "moving onto itself",
        );
        assert!(temp.path().join("dir/sub/keep.txt").exists());

        assert_eq!(
            fs.copy(&cancel, "/dir/sub/keep.txt", "/dir", &CopyOptions::default()),
            Err(FsError::InvalidInput),
            "copying over an ancestor",
        );
        assert_eq!(read(&fs, &cancel, "/dir/sub/keep.txt"), "keep");
    }

    #[test]
    fn test_move_across_devices_file() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from.txt");
        let to = temp.path().join("to.txt");
        std::fs::write(&from, b"first").unwrap();

        move_across_devices(&from, &to, false, &MoveOptions::default()).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"first");

        std::fs::write(&from, b"second").unwrap();
        assert_eq!(
            move_across_devices(&from, &to, false, &MoveOptions { no_overwrite: true }),
            Err(FsError::AlreadyExists),
        );
        assert_eq!(std::fs::read(&to).unwrap(), b"first");

        move_across_devices(&from, &to, false, &MoveOptions::default()).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"second");
    }

    #[test]
    fn test_move_across_devices_directory() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from");
        let to = temp.path().join("to");
        std::fs::create_dir_all(from.join("nested")).unwrap();
        std::fs::write(from.join("nested/a.txt"), b"a").unwrap();

        move_across_devices(&from, &to, true, &MoveOptions::default()).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(to.join("nested/a.txt")).unwrap(), b"a");

        std::fs::create_dir_all(&from).unwrap();
        std::fs::write(from.join("b.txt"), b"b").unwrap();
        assert_eq!(
            move_across_devices(&from, &to, true, &MoveOptions { no_overwrite: true }),
            Err(FsError::AlreadyExists),
        );
        assert!(from.join("b.txt").exists());

        move_across_devices(&from, &to, true, &MoveOptions::default()).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(to.join("b.txt")).unwrap(), b"b");
        assert!(!to.join("nested").exists(), "the old tree is replaced");
        assert!(!to.join("from").exists(), "nothing is moved inside the old tree");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_stat_does_not_follow() {
        let (temp, fs, cancel) = setup();
        std::os::unix::fs::symlink(temp.path().join("gone"), temp.path().join("dangling"))
            .unwrap();

        assert_eq!(
            fs.stat(&cancel, "/dangling").unwrap_err(),
            FsError::EntryNotFound,
        );
        let info = fs.symlink_stat(&cancel, "/dangling").unwrap();
        assert_eq!(info.path, "dangling");
        assert!(!info.is_dir);
    }

    #[test]
    fn test_cancelled_operations_do_nothing() {
        let (temp, fs, cancel) = setup();
        cancel.cancel();

        assert_eq!(
            fs.create(&cancel, "/file.txt", &mut &b"x"[..], &CreateOptions::default())
                .unwrap_err(),
            FsError::Interrupted,
        );
        assert_eq!(fs.mkdir(&cancel, "/dir"), Err(FsError::Interrupted));
        assert_eq!(fs.stat(&cancel, "/").unwrap_err(), FsError::Interrupted);
        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
    }
}
