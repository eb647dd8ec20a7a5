//! Image upload adapter.
//!
//! A selected file is shown immediately through a local preview, uploaded to
//! an [`AssetHost`] in the background, and swapped for the durable URL once
//! the host accepts it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::draft::{Draft, DraftError, ImageRef, ImageTarget, SharedDraft};
use crate::session::SessionGate;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024; // 5MB

/// A file picked by the user.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,

    #[error("file is {size} bytes; the maximum is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported image type; allowed: JPEG, PNG, GIF, WebP")]
    UnsupportedType,

    #[error(transparent)]
    Target(#[from] DraftError),

    /// The host rejected or never received the file. The preview stays.
    #[error("image upload failed: {0}")]
    Host(String),
}

/// Detect the image type from its leading bytes.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Check a file before showing or uploading it; returns its MIME type.
pub fn check_file(file: &LocalFile) -> Result<&'static str, UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if file.bytes.len() > MAX_IMAGE_BYTES {
        return Err(UploadError::TooLarge {
            size: file.bytes.len(),
            limit: MAX_IMAGE_BYTES,
        });
    }
    sniff_image_type(&file.bytes).ok_or(UploadError::UnsupportedType)
}

// ============================================================================
// Preview registry
// ============================================================================

/// Local preview handles. Each handle is released at most once.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    live: Mutex<HashSet<String>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, file: &LocalFile) -> String {
        let url = format!("blob:preview/{}", Uuid::new_v4());
        self.live().insert(url.clone());
        tracing::trace!(preview = %url, file = %file.name, "preview created");
        url
    }

    /// `false` if the handle was unknown or already released.
    pub fn release(&self, url: &str) -> bool {
        let released = self.live().remove(url);
        if released {
            tracing::trace!(preview = %url, "preview released");
        }
        released
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live().contains(url)
    }

    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    /// Release everything, e.g. when the editor closes. Returns the count.
    pub fn release_all(&self) -> usize {
        let mut live = self.live();
        let count = live.len();
        live.clear();
        count
    }
}

// ============================================================================
// Asset host
// ============================================================================

#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Upload `file` and return its durable URL.
    async fn upload(&self, file: &LocalFile, mime: &str) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct HostedAsset {
    #[serde(default, alias = "secureUrl")]
    secure_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Multipart upload to an HTTP endpoint (the dev backend or a CDN).
#[derive(Clone)]
pub struct HttpAssetHost {
    client: reqwest::Client,
    endpoint: String,
    preset: Option<String>,
    session: Option<Arc<SessionGate>>,
}

impl HttpAssetHost {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            preset: None,
            session: None,
        }
    }

    /// Sent as the `upload_preset` form field.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Attach the session's bearer token to uploads.
    pub fn with_session(mut self, gate: Arc<SessionGate>) -> Self {
        self.session = Some(gate);
        self
    }
}

#[async_trait]
impl AssetHost for HttpAssetHost {
    async fn upload(&self, file: &LocalFile, mime: &str) -> Result<String, UploadError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| UploadError::Host(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(preset) = &self.preset {
            form = form.text("upload_preset", preset.clone());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(gate) = &self.session {
            if let Some(token) = gate.token().await {
                request = request.bearer_auth(token);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Host(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Host(format!("{}: {}", status.as_u16(), body)));
        }

        let asset: HostedAsset = response
            .json()
            .await
            .map_err(|e| UploadError::Host(e.to_string()))?;
        asset
            .secure_url
            .or(asset.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UploadError::Host("response carried no url".to_string()))
    }
}

// ============================================================================
// Adapter
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Committed { url: String },
    /// A newer selection replaced this one before the upload finished.
    Superseded,
}

fn holds_preview(draft: &Draft, preview: &str) -> bool {
    std::iter::once(&draft.hero.hero_image)
        .chain(draft.projects.iter().map(|p| &p.image))
        .any(|image| image.preview() == Some(preview))
}

pub struct ImageUploadAdapter {
    draft: SharedDraft,
    host: Arc<dyn AssetHost>,
    previews: PreviewRegistry,
}

impl ImageUploadAdapter {
    pub fn new(draft: SharedDraft, host: Arc<dyn AssetHost>) -> Self {
        Self {
            draft,
            host,
            previews: PreviewRegistry::new(),
        }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Show `file` in `target` at once, then upload it and commit the URL.
    ///
    /// The draft lock is held only while the preview is placed and while the
    /// result is applied, never across the upload.
    pub async fn handle_file_change(
        &self,
        file: LocalFile,
        target: ImageTarget,
    ) -> Result<UploadOutcome, UploadError> {
        let mime = check_file(&file)?;

        let preview = self.previews.create(&file);
        {
            let mut store = self.draft.lock().await;
            let previous = store.get().image(target).cloned();
            if let Err(e) = store.set(target.update(ImageRef::Pending {
                preview: preview.clone(),
            })) {
                self.previews.release(&preview);
                return Err(e.into());
            }
            if let Some(ImageRef::Pending { preview: old }) = previous {
                self.previews.release(&old);
            }
        }
        tracing::debug!(file = %file.name, ?target, bytes = file.bytes.len(), "image selected");

        let result = self.host.upload(&file, mime).await;

        let mut store = self.draft.lock().await;
        match result {
            Ok(url) => {
                let current = store.get().image(target).and_then(|i| i.preview());
                if current == Some(preview.as_str()) {
                    store.set(target.update(ImageRef::Committed { url: url.clone() }))?;
                    self.previews.release(&preview);
                    tracing::info!(?target, url = %url, "image uploaded");
                    Ok(UploadOutcome::Committed { url })
                } else {
                    if !holds_preview(store.get(), &preview) {
                        self.previews.release(&preview);
                    }
                    tracing::debug!(?target, "upload finished after a newer selection; discarding");
                    Ok(UploadOutcome::Superseded)
                }
            }
            Err(e) => {
                tracing::warn!(
                    ?target,
                    error = %e,
                    "image upload failed; the preview is shown but not saved"
                );
                Err(e)
            }
        }
    }

    /// Release every outstanding preview.
    pub fn close(&self) -> usize {
        self.previews.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::draft::DraftStore;
    use crate::template::TemplateKind;
    use std::time::Duration;

    const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    /// Host that answers per file name after an optional delay.
    #[derive(Default)]
    struct FakeHost {
        delays: Vec<(String, Duration)>,
        fail: bool,
    }

    #[async_trait]
    impl AssetHost for FakeHost {
        async fn upload(&self, file: &LocalFile, _mime: &str) -> Result<String, UploadError> {
            if let Some((_, delay)) = self.delays.iter().find(|(n, _)| *n == file.name) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail {
                return Err(UploadError::Host("503: unavailable".into()));
            }
            Ok(format!("https://cdn.example.com/{}", file.name))
        }
    }

    fn adapter(host: FakeHost) -> (ImageUploadAdapter, SharedDraft) {
        let draft = DraftStore::open(TemplateKind::One, Arc::new(MemoryCache::new())).into_shared();
        (ImageUploadAdapter::new(draft.clone(), Arc::new(host)), draft)
    }

    #[test]
    fn test_sniff_image_type() {
        assert_eq!(sniff_image_type(&PNG), Some("image/png"));
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image_type(b"%PDF-1.4"), None);
        assert_eq!(sniff_image_type(&[]), None);
    }

    #[test]
    fn test_check_file_limits() {
        assert_eq!(check_file(&LocalFile::new("a.png", vec![])), Err(UploadError::Empty));
        assert_eq!(
            check_file(&LocalFile::new("a.pdf", b"%PDF-1.4".to_vec())),
            Err(UploadError::UnsupportedType)
        );
        let mut big = PNG.to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            check_file(&LocalFile::new("big.png", big)),
            Err(UploadError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_registry_releases_once() {
        let registry = PreviewRegistry::new();
        let url = registry.create(&LocalFile::new("a.png", PNG.to_vec()));
        assert!(registry.is_live(&url));
        assert!(registry.release(&url));
        assert!(!registry.release(&url));
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_upload_commits_url() {
        let (adapter, draft) = adapter(FakeHost::default());
        let outcome = adapter
            .handle_file_change(LocalFile::new("me.png", PNG.to_vec()), ImageTarget::Hero)
            .await
            .unwrap();

        let url = "https://cdn.example.com/me.png".to_string();
        assert_eq!(outcome, UploadOutcome::Committed { url: url.clone() });
        assert_eq!(draft.lock().await.get().hero.hero_image, ImageRef::Committed { url });
        assert_eq!(adapter.previews().live_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_preview() {
        let (adapter, draft) = adapter(FakeHost {
            fail: true,
            ..FakeHost::default()
        });
        let err = adapter
            .handle_file_change(LocalFile::new("p.png", PNG.to_vec()), ImageTarget::Project(0))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Host(_)));

        let image = draft.lock().await.get().projects[0].image.clone();
        assert!(image.is_pending());
        assert_eq!(adapter.previews().live_count(), 1);
        assert_eq!(adapter.close(), 1);
        assert_eq!(adapter.previews().live_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_project_is_rejected_without_leak() {
        let (adapter, _) = adapter(FakeHost::default());
        let err = adapter
            .handle_file_change(LocalFile::new("p.png", PNG.to_vec()), ImageTarget::Project(3))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Target(DraftError::IndexOutOfRange { .. })));
        assert_eq!(adapter.previews().live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_selection_wins() {
        let (adapter, draft) = adapter(FakeHost {
            delays: vec![
                ("slow.png".into(), Duration::from_secs(2)),
                ("fast.png".into(), Duration::from_secs(1)),
            ],
            fail: false,
        });

        let (slow, fast) = tokio::join!(
            adapter.handle_file_change(LocalFile::new("slow.png", PNG.to_vec()), ImageTarget::Hero),
            adapter.handle_file_change(LocalFile::new("fast.png", PNG.to_vec()), ImageTarget::Hero),
        );
        assert_eq!(slow.unwrap(), UploadOutcome::Superseded);
        assert!(matches!(fast.unwrap(), UploadOutcome::Committed { .. }));
        assert_eq!(
            draft.lock().await.get().hero.hero_image,
            ImageRef::Committed {
                url: "https://cdn.example.com/fast.png".into()
            }
        );
        assert_eq!(adapter.previews().live_count(), 0);
    }
}
