use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Film,
    Episode,
    Thumbnail,
    Screenshot,
}

impl MediaKind {
    const ALL: [MediaKind; 4] = [
        MediaKind::Film,
        MediaKind::Episode,
        MediaKind::Thumbnail,
        MediaKind::Screenshot,
    ];

    pub fn directory(self) -> &'static str {
        match self {
            MediaKind::Film => "films",
            MediaKind::Episode => "episodes",
            MediaKind::Thumbnail => "thumbnails",
            MediaKind::Screenshot => "screenshots",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, MediaKind::Film | MediaKind::Episode)
    }
}

/// A file that was written to the media tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub kind: MediaKind,
    pub name: String,
}

/// Uploaded media on the local filesystem, one directory per [`MediaKind`].
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_layout(&self) -> io::Result<()> {
        for kind in MediaKind::ALL {
            fs::create_dir_all(self.root.join(kind.directory())).await?;
        }
        Ok(())
    }

    /// Resolves a stored name to its path. Names that could escape the kind directory are rejected.
    pub fn path(&self, kind: MediaKind, name: &str) -> Result<PathBuf, Error> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || Path::new(name).components().count() != 1
        {
            return Err(Error::NotFound("media file"));
        }
        Ok(self.root.join(kind.directory()).join(name))
    }

    /// Writes `chunks` to a freshly generated name. A partially written file is removed on failure.
    pub async fn save_stream<S, E>(
        &self,
        kind: MediaKind,
        original_name: &str,
        chunks: S,
    ) -> Result<StoredFile, Error>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Error>,
    {
        let name = generated_name(original_name);
        let path = self.root.join(kind.directory()).join(&name);
        if let Err(err) = write_chunks(&path, chunks).await {
            if let Err(cleanup) = fs::remove_file(&path).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("failed to remove partial upload {}: {cleanup}", path.display());
                }
            }
            return Err(err);
        }
        debug!("stored {} as {}", original_name, path.display());
        Ok(StoredFile { kind, name })
    }

    /// Whether `name` is a file currently stored as `kind`.
    pub async fn contains(&self, kind: MediaKind, name: &str) -> bool {
        let Ok(path) = self.path(kind, name) else {
            return false;
        };
        fs::metadata(&path).await.is_ok_and(|meta| meta.is_file())
    }

    /// Removes a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, kind: MediaKind, name: &str) -> io::Result<()> {
        let path = self.path(kind, name).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid stored name {name:?}"),
            )
        })?;
        match fs::remove_file(&path).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Removes every file in `files`, logging instead of failing.
    ///
    /// Used once the owning rows are already gone, where there is nothing left to roll back.
    pub async fn remove_all(&self, files: &[StoredFile]) {
        for file in files {
            if let Err(err) = self.remove(file.kind, &file.name).await {
                warn!(
                    "failed to remove {}/{}: {err}",
                    file.kind.directory(),
                    file.name
                );
            }
        }
    }
}

async fn write_chunks<S, E>(path: &Path, chunks: S) -> Result<(), Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<Error>,
{
    let mut file = fs::File::create(path).await?;
    futures::pin_mut!(chunks);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(Into::into)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// `<uuid>_<sanitized original name>`
pub fn generated_name(original_name: &str) -> String {
    let sanitized = sanitize_file_name(original_name);
    if sanitized.is_empty() {
        return Uuid::new_v4().to_string();
    }
    format!("{}_{sanitized}", Uuid::new_v4())
}

/// Keeps the final path component and reduces it to `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mapped: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    mapped.trim_start_matches(['.', '_']).to_owned()
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My Movie (2020).mp4"), "My_Movie_2020.mp4");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\clip.mkv"), "clip.mkv");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("épisode.mp4"), "pisode.mp4");
    }

    #[test]
    fn test_generated_names_do_not_collide() {
        let a = generated_name("clip.mp4");
        let b = generated_name("clip.mp4");
        assert_ne!(a, b);
        assert!(a.ends_with("_clip.mp4"));
    }

    #[test]
    fn test_path_rejects_traversal() {
        let storage = MediaStorage::new("/srv/media");
        assert!(storage.path(MediaKind::Thumbnail, "../secret").is_err());
        assert!(storage.path(MediaKind::Thumbnail, "a/b.png").is_err());
        assert!(storage.path(MediaKind::Thumbnail, "..").is_err());
        assert_eq!(
            storage.path(MediaKind::Thumbnail, "x.png").unwrap(),
            PathBuf::from("/srv/media/thumbnails/x.png")
        );
    }

    #[tokio::test]
    async fn test_contains_only_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        storage.ensure_layout().await.unwrap();
        let path = storage.path(MediaKind::Screenshot, "receipt.png").unwrap();
        tokio::fs::write(&path, b"png").await.unwrap();

        assert!(storage.contains(MediaKind::Screenshot, "receipt.png").await);
        assert!(!storage.contains(MediaKind::Thumbnail, "receipt.png").await);
        assert!(!storage.contains(MediaKind::Screenshot, "missing.png").await);
        assert!(!storage.contains(MediaKind::Screenshot, "..").await);
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        storage.ensure_layout().await.unwrap();

        let chunks = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        let stored = storage
            .save_stream(MediaKind::Episode, "pilot.mp4", chunks)
            .await
            .unwrap();
        let path = storage.path(MediaKind::Episode, &stored.name).unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"hello world");

        storage.remove(stored.kind, &stored.name).await.unwrap();
        assert!(!path.exists());
        // already removed
        storage.remove(stored.kind, &stored.name).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        storage.ensure_layout().await.unwrap();

        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let result = storage.save_stream(MediaKind::Film, "movie.mp4", chunks).await;
        assert!(matches!(result, Err(Error::Storage(_))));

        let mut entries = fs::read_dir(dir.path().join("films")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
