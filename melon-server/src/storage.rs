use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest accepted image upload
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum images attached to a single post
pub const MAX_IMAGES_PER_POST: usize = 4;

/// URL prefix the store's files are served under
const PUBLIC_PREFIX: &str = "/images/";

/// File extension for an accepted image content type, None for
/// anything we do not store
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Manages on-disk image storage.
///
/// Post images live at `{root}/{post_id}/{timestamp}-{uuid}.{ext}`,
/// avatars at `{root}/avatars/{user_id}/{timestamp}-{uuid}.{ext}`.
/// Files are served back under `/images/`.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Image storage directory: {}", root.display());
        Ok(Self { root })
    }

    /// Directory images are served from, for wiring up static serving
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store one post image, returning its public URL path
    pub async fn save_post_image(
        &self,
        post_id: &Uuid,
        content_type: &str,
        data: &[u8],
    ) -> Result<String> {
        self.save(&post_id.to_string(), content_type, data).await
    }

    /// Store a user's avatar, returning its public URL path
    pub async fn save_avatar(
        &self,
        user_id: &Uuid,
        content_type: &str,
        data: &[u8],
    ) -> Result<String> {
        let subdir = format!("avatars/{}", user_id);
        self.save(&subdir, content_type, data).await
    }

    async fn save(&self, subdir: &str, content_type: &str, data: &[u8]) -> Result<String> {
        let ext = match extension_for(content_type) {
            Some(ext) => ext,
            None => bail!("Unsupported image content type: {}", content_type),
        };
        if data.len() > MAX_IMAGE_BYTES {
            bail!("Image exceeds the {} byte limit", MAX_IMAGE_BYTES);
        }

        let filename = format!("{}-{}.{}", Utc::now().timestamp_millis(), Uuid::new_v4(), ext);
        let dir = self.root.join(subdir);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&filename), data)
            .await
            .context("Failed to write image")?;

        Ok(format!("{}{}/{}", PUBLIC_PREFIX, subdir, filename))
    }

    /// Delete a stored file by its public URL path. Unknown paths and
    /// already-deleted files are tolerated; traversal outside the
    /// storage root is not.
    pub async fn delete_public_path(&self, url_path: &str) -> Result<()> {
        let rel = match url_path.strip_prefix(PUBLIC_PREFIX) {
            Some(rel) => rel,
            None => bail!("Not a stored image path: {}", url_path),
        };
        let rel_path = Path::new(rel);
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Refusing path traversal: {}", url_path);
        }

        let path = self.root.join(rel_path);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted image {}", url_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", url_path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a post's entire image directory
    pub async fn delete_post_images(&self, post_id: &Uuid) -> Result<()> {
        let dir = self.root.join(post_id.to_string());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Deleted images for post {}", post_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove per-post image directories whose post no longer exists.
    /// Avatars are keyed by user and never swept here. Returns the
    /// number of directories removed.
    pub async fn sweep_orphans(&self, live_post_ids: &HashSet<String>) -> Result<usize> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name == "avatars" {
                continue;
            }
            // Only directories named by a post id are candidates
            if Uuid::parse_str(&name).is_err() {
                continue;
            }
            if live_post_ids.contains(&name) {
                continue;
            }

            if let Err(e) = fs::remove_dir_all(entry.path()).await {
                warn!("Failed to sweep orphaned images {}: {}", name, e);
            } else {
                info!("Swept orphaned images for deleted post {}", name);
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (tempfile::TempDir, ImageStore) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = ImageStore::new(dir.path().join("uploads"))
            .await
            .expect("Failed to create store");
        (dir, store)
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/gif"), Some("gif"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("image/svg+xml"), None);
        assert_eq!(extension_for("text/plain"), None);
    }

    #[tokio::test]
    async fn test_save_post_image_roundtrip() {
        let (_dir, store) = setup().await;
        let post_id = Uuid::new_v4();

        let url = store
            .save_post_image(&post_id, "image/png", b"not-really-a-png")
            .await
            .expect("Failed to save");

        assert!(url.starts_with(&format!("/images/{}/", post_id)));
        assert!(url.ends_with(".png"));

        let rel = url.strip_prefix("/images/").unwrap();
        let on_disk = store.root().join(rel);
        let bytes = fs::read(on_disk).await.expect("Failed to read back");
        assert_eq!(bytes, b"not-really-a-png");
    }

    #[tokio::test]
    async fn test_avatar_goes_under_avatars_dir() {
        let (_dir, store) = setup().await;
        let user_id = Uuid::new_v4();

        let url = store
            .save_avatar(&user_id, "image/jpeg", b"jpeg-bytes")
            .await
            .expect("Failed to save");
        assert!(url.starts_with(&format!("/images/avatars/{}/", user_id)));
        assert!(url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_save_rejects_unknown_content_type() {
        let (_dir, store) = setup().await;
        let result = store
            .save_post_image(&Uuid::new_v4(), "application/pdf", b"%PDF")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_save_rejects_oversize() {
        let (_dir, store) = setup().await;
        let data = vec![0u8; MAX_IMAGE_BYTES + 1];
        let result = store
            .save_post_image(&Uuid::new_v4(), "image/png", &data)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_public_path() {
        let (_dir, store) = setup().await;
        let post_id = Uuid::new_v4();
        let url = store
            .save_post_image(&post_id, "image/gif", b"gif")
            .await
            .expect("Failed to save");

        store
            .delete_public_path(&url)
            .await
            .expect("Failed to delete");

        let rel = url.strip_prefix("/images/").unwrap();
        assert!(!store.root().join(rel).exists());

        // Deleting again is fine
        store
            .delete_public_path(&url)
            .await
            .expect("Second delete should be tolerated");
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let (_dir, store) = setup().await;
        assert!(store
            .delete_public_path("/images/../../etc/passwd")
            .await
            .is_err());
        assert!(store.delete_public_path("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_post_images_removes_directory() {
        let (_dir, store) = setup().await;
        let post_id = Uuid::new_v4();
        store
            .save_post_image(&post_id, "image/png", b"one")
            .await
            .expect("save");
        store
            .save_post_image(&post_id, "image/png", b"two")
            .await
            .expect("save");

        store
            .delete_post_images(&post_id)
            .await
            .expect("Failed to delete");
        assert!(!store.root().join(post_id.to_string()).exists());

        // Missing directory is tolerated
        store
            .delete_post_images(&post_id)
            .await
            .expect("Second delete should be tolerated");
    }

    #[tokio::test]
    async fn test_sweep_removes_only_orphans() {
        let (_dir, store) = setup().await;
        let live = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let user = Uuid::new_v4();

        store
            .save_post_image(&live, "image/png", b"live")
            .await
            .expect("save");
        store
            .save_post_image(&orphan, "image/png", b"orphan")
            .await
            .expect("save");
        store
            .save_avatar(&user, "image/png", b"avatar")
            .await
            .expect("save");

        let mut live_ids = HashSet::new();
        live_ids.insert(live.to_string());

        let removed = store.sweep_orphans(&live_ids).await.expect("sweep");
        assert_eq!(removed, 1);
        assert!(store.root().join(live.to_string()).exists());
        assert!(!store.root().join(orphan.to_string()).exists());
        assert!(store.root().join("avatars").exists());
    }
}
