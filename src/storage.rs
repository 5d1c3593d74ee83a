use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{error::Error, form::ImagePayload};

/// Object storage for recipe images and avatars. The core only keeps the
/// returned reference.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the image under `folder` and returns its reference.
    async fn put(&self, folder: &str, image: ImagePayload) -> Result<String, Error>;
    async fn delete(&self, reference: &str) -> Result<(), Error>;
    /// Public URL for a stored reference.
    fn url(&self, reference: &str) -> String;
}

fn file_name(folder: &str, image: &ImagePayload) -> String {
    format!("{folder}/{}.{}", uuid::Uuid::new_v4(), image.extension)
}

/// Files under a media root served by the front proxy at `media_url`.
pub struct LocalStorage {
    root: PathBuf,
    media_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, media_url: &str) -> Self {
        Self {
            root: root.into(),
            media_url: media_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, folder: &str, image: ImagePayload) -> Result<String, Error> {
        let reference = file_name(folder, &image);
        let path = self.root.join(&reference);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("{e}")))?;
        }
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| Error::Storage(format!("{e}")))?;

        log::trace!("> Stored {reference} ({} bytes)", image.bytes.len());
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.root.join(reference)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("{e}"))),
        }
    }

    fn url(&self, reference: &str) -> String {
        format!("{}/{reference}", self.media_url)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, reference: &str) -> bool {
        self.objects.lock().await.contains_key(reference)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, folder: &str, image: ImagePayload) -> Result<String, Error> {
        let reference = file_name(folder, &image);
        self.objects
            .lock()
            .await
            .insert(reference.clone(), image.bytes);
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), Error> {
        self.objects.lock().await.remove(reference);
        Ok(())
    }

    fn url(&self, reference: &str) -> String {
        format!("/media/{reference}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_references_keep_folder_and_extension() {
        let storage = MemoryStorage::new();
        let image = ImagePayload {
            extension: "png".into(),
            bytes: vec![1, 2, 3],
        };

        let reference = storage.put("recipes", image).await.unwrap();
        assert!(reference.starts_with("recipes/"));
        assert!(reference.ends_with(".png"));
        assert!(storage.contains(&reference).await);
        assert_eq!(storage.url(&reference), format!("/media/{reference}"));

        storage.delete(&reference).await.unwrap();
        assert!(!storage.contains(&reference).await);
    }
}
