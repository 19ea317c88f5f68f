//! Local-filesystem store implementations.
//!
//! Keys are `/`-separated paths relative to a root directory. The source
//! side lists regular files in lexicographic key order with marker-resumable
//! pages, mirroring how blob services page flat key listings; the
//! destination side stores objects under `root/container/`, computing the
//! MD5 it reports (and persists in a `.md5` sidecar) while the upload
//! streams through a temp file that is renamed into place.
//!
//! The listing walk re-runs per page, so pages form a consistent sequence
//! only while the tree is not mutated underneath a run.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use checksums::{Md5Hasher, copy_and_hash};

use crate::{DestinationStore, ListingPage, ObjectSummary, SourceStore, StoreError};

/// Source store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalSourceStore {
    root: PathBuf,
}

impl LocalSourceStore {
    /// Serves objects from the tree under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collect_objects(&self) -> Result<Vec<ObjectSummary>, StoreError> {
        let mut objects = Vec::new();
        walk_sorted(&self.root, String::new(), &mut objects)?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

impl SourceStore for LocalSourceStore {
    fn list_page(
        &self,
        marker: &str,
        page_size: usize,
        prefix: Option<&str>,
    ) -> Result<ListingPage, StoreError> {
        let mut objects = self.collect_objects()?;
        if let Some(prefix) = prefix {
            objects.retain(|object| object.key.starts_with(prefix));
        }

        let start = objects.partition_point(|object| object.key.as_str() <= marker);
        let end = (start + page_size).min(objects.len());
        let next_marker =
            (end > start && end < objects.len()).then(|| objects[end - 1].key.clone());
        let items: Vec<ObjectSummary> = objects[start..end].to_vec();

        debug!(
            marker,
            count = items.len(),
            next = next_marker.as_deref().unwrap_or("<end>"),
            "listed source page"
        );
        Ok(ListingPage { items, next_marker })
    }

    fn open_object(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = self.root.join(key_to_relative_path(key)?);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_owned(),
            }),
            Err(source) => Err(StoreError::io(path, source)),
        }
    }
}

/// Destination store writing into `root/container/`.
#[derive(Debug, Clone)]
pub struct LocalDestinationStore {
    root: PathBuf,
    container: String,
}

impl LocalDestinationStore {
    /// Stores objects under `root/container/`. The container name must be a
    /// single path component; [`DestinationStore::ensure_container`] rejects
    /// anything else.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
        }
    }

    fn container_dir(&self) -> PathBuf {
        self.root.join(&self.container)
    }

    fn data_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.container_dir().join(key_to_relative_path(name)?))
    }

    /// The checksum persisted alongside a stored object, if any.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the sidecar exists but cannot be read.
    pub fn stored_checksum(&self, name: &str) -> Result<Option<String>, StoreError> {
        let sidecar = sidecar_path(&self.data_path(name)?);
        match fs::read_to_string(&sidecar) {
            Ok(checksum) => Ok(Some(checksum)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::io(sidecar, source)),
        }
    }
}

impl DestinationStore for LocalDestinationStore {
    fn ensure_container(&mut self) -> Result<(), StoreError> {
        if self.container.is_empty()
            || self
                .container
                .contains(['/', '\\'])
            || self.container == "."
            || self.container == ".."
        {
            return Err(StoreError::invalid_key(
                self.container.clone(),
                "container name must be a single plain path component",
            ));
        }

        let dir = self.container_dir();
        fs::create_dir_all(&dir).map_err(|source| StoreError::io(&dir, source))?;
        debug!(container = %self.container, "ensured destination container");
        Ok(())
    }

    fn object_exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.data_path(name)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::io(path, source)),
        }
    }

    fn put_object(&mut self, name: &str, reader: &mut dyn Read) -> Result<String, StoreError> {
        let path = self.data_path(name)?;
        let parent = path.parent().ok_or_else(|| {
            StoreError::invalid_key(name, "key resolves to the container itself")
        })?;
        fs::create_dir_all(parent).map_err(|source| StoreError::io(parent, source))?;

        // Stage next to the final location so the rename stays on one
        // filesystem.
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::invalid_key(name, "key has no final component"))?;
        let tmp = parent.join(format!(".{file_name}.partial"));

        match write_object(&tmp, reader) {
            Ok((checksum, bytes)) => {
                fs::rename(&tmp, &path).map_err(|source| StoreError::io(&path, source))?;
                let sidecar = sidecar_path(&path);
                fs::write(&sidecar, &checksum)
                    .map_err(|source| StoreError::io(&sidecar, source))?;
                debug!(name, bytes, checksum = %checksum, "stored destination object");
                Ok(checksum)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

fn write_object(tmp: &Path, reader: &mut dyn Read) -> Result<(String, u64), StoreError> {
    let mut out = File::create(tmp).map_err(|source| StoreError::io(tmp, source))?;
    let mut hasher = Md5Hasher::new();
    let bytes =
        copy_and_hash(reader, &mut out, &mut hasher).map_err(|source| StoreError::io(tmp, source))?;
    out.sync_all().map_err(|source| StoreError::io(tmp, source))?;
    Ok((hasher.finalize(), bytes))
}

fn sidecar_path(data_path: &Path) -> PathBuf {
    let mut s = data_path.as_os_str().to_owned();
    s.push(".md5");
    PathBuf::from(s)
}

/// Walks `dir` depth-first with per-directory sorted entries, collecting
/// every regular file as an object keyed by its `/`-joined relative path.
fn walk_sorted(
    dir: &Path,
    key_prefix: String,
    objects: &mut Vec<ObjectSummary>,
) -> Result<(), StoreError> {
    let read_dir = fs::read_dir(dir).map_err(|source| StoreError::io(dir, source))?;
    let mut names: Vec<OsString> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| StoreError::io(dir, source))?;
        names.push(entry.file_name());
    }
    names.sort();

    for name in names {
        let path = dir.join(&name);
        let Some(name) = name.to_str() else {
            warn!(path = %path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        let key = if key_prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{key_prefix}/{name}")
        };

        let metadata = fs::symlink_metadata(&path).map_err(|source| StoreError::io(&path, source))?;
        if metadata.is_dir() {
            walk_sorted(&path, key, objects)?;
        } else if metadata.is_file() {
            objects.push(ObjectSummary {
                key,
                size: metadata.len(),
                last_modified: metadata.modified().ok(),
            });
        }
        // Symlinks and special files are not objects.
    }
    Ok(())
}

fn key_to_relative_path(key: &str) -> Result<PathBuf, StoreError> {
    if key.is_empty() {
        return Err(StoreError::invalid_key(key, "key is empty"));
    }
    if key.starts_with('/') {
        return Err(StoreError::invalid_key(key, "key is absolute"));
    }

    let mut path = PathBuf::new();
    for component in key.split('/') {
        match component {
            "" => return Err(StoreError::invalid_key(key, "key has an empty component")),
            "." | ".." => {
                return Err(StoreError::invalid_key(key, "key escapes the store root"));
            }
            normal => path.push(normal),
        }
    }
    Ok(path)
}
