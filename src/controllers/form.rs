use std::str::FromStr;

use ahash::AHashMap;
use axum::extract::Multipart;
use tracing::debug;

use crate::config::Config;
use crate::errors::Error;
use crate::storage::{MediaKind, MediaStorage, StoredFile};

/// A multipart submission whose file parts were streamed straight to storage.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    fields: AHashMap<String, String>,
    files: AHashMap<String, StoredFile>,
}

impl UploadForm {
    /// Reads every part. Parts named in `file_fields` are stored as that kind; the rest are text.
    ///
    /// Nothing is left in storage when reading fails.
    pub(crate) async fn read(
        mut multipart: Multipart,
        storage: &MediaStorage,
        config: &Config,
        file_fields: &[(&str, MediaKind)],
    ) -> Result<Self, Error> {
        let mut form = Self::default();
        let result = form
            .read_parts(&mut multipart, storage, config, file_fields)
            .await;
        match result {
            Ok(()) => Ok(form),
            Err(err) => {
                form.discard(storage).await;
                Err(err)
            }
        }
    }

    async fn read_parts(
        &mut self,
        multipart: &mut Multipart,
        storage: &MediaStorage,
        config: &Config,
        file_fields: &[(&str, MediaKind)],
    ) -> Result<(), Error> {
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(ToOwned::to_owned) else {
                continue;
            };
            let kind = file_fields
                .iter()
                .find(|(field_name, _)| *field_name == name)
                .map(|(_, kind)| *kind);
            let Some(kind) = kind else {
                let value = field.text().await?;
                self.fields.insert(name, value);
                continue;
            };

            let file_name = field.file_name().unwrap_or_default().to_owned();
            if file_name.is_empty() {
                // an empty file input
                continue;
            }
            if !config.is_allowed(kind, &file_name) {
                return Err(Error::validation(format!(
                    "{file_name} is not an allowed {} file",
                    kind.directory()
                )));
            }
            let stored = storage.save_stream(kind, &file_name, field).await?;
            debug!("received {name} as {}", stored.name);
            if let Some(previous) = self.files.insert(name, stored) {
                storage.remove_all(&[previous]).await;
            }
        }
        Ok(())
    }

    pub(crate) fn file(&self, name: &str) -> Option<&StoredFile> {
        self.files.get(name)
    }

    pub(crate) fn required_file(&self, name: &'static str) -> Result<&StoredFile, Error> {
        self.file(name)
            .ok_or_else(|| Error::validation(format!("{name} is required")))
    }

    /// A trimmed text field, absent when missing or blank.
    pub(crate) fn optional(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn required(&self, name: &'static str) -> Result<&str, Error> {
        self.optional(name)
            .ok_or_else(|| Error::validation(format!("{name} is required")))
    }

    pub(crate) fn number<T: FromStr>(&self, name: &'static str) -> Result<T, Error> {
        self.required(name)?
            .parse()
            .map_err(|_| Error::validation(format!("{name} must be a number")))
    }

    /// Passes `result` through, removing the stored files if it is an error.
    pub(crate) async fn discard_on_err<T>(
        &self,
        storage: &MediaStorage,
        result: Result<T, Error>,
    ) -> Result<T, Error> {
        if result.is_err() {
            self.discard(storage).await;
        }
        result
    }

    pub(crate) async fn discard(&self, storage: &MediaStorage) {
        let files: Vec<StoredFile> = self.files.values().cloned().collect();
        storage.remove_all(&files).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> UploadForm {
        UploadForm {
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            files: AHashMap::new(),
        }
    }

    #[test]
    fn test_text_fields() {
        let form = form(&[("title", "  Heat "), ("genre", "   "), ("year", "1995")]);
        assert_eq!(form.required("title").unwrap(), "Heat");
        assert_eq!(form.optional("genre"), None);
        assert!(matches!(form.required("genre"), Err(Error::Validation(_))));
        assert_eq!(form.number::<i32>("year").unwrap(), 1995);
    }

    #[test]
    fn test_number_rejects_text() {
        let form = form(&[("price", "ten")]);
        assert!(matches!(form.number::<i64>("price"), Err(Error::Validation(_))));
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_discard_on_err_removes_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        storage.ensure_layout().await.unwrap();
        let path = storage.path(MediaKind::Thumbnail, "poster.png").unwrap();
        tokio::fs::write(&path, b"png").await.unwrap();
        let mut form = form(&[("title", "Heat")]);
        form.files.insert(
            "thumbnail".to_owned(),
            StoredFile {
                kind: MediaKind::Thumbnail,
                name: "poster.png".to_owned(),
            },
        );

        let kept = form.discard_on_err(&storage, form.required("title").map(str::len));
        assert_send(&kept);
        assert_eq!(kept.await.unwrap(), 4);
        assert!(path.exists());

        let parsed = form.number::<i32>("year");
        assert!(form.discard_on_err(&storage, parsed).await.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_is_a_validation_error() {
        let form = form(&[]);
        assert!(form.file("media_file").is_none());
        assert!(matches!(
            form.required_file("media_file"),
            Err(Error::Validation(_))
        ));
    }
}
