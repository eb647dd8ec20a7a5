//! Draft store: the in-memory draft mirrored into the local cache.

use std::sync::Arc;

use super::{Draft, DraftError, FieldUpdate, ListField};
use crate::cache::{CacheError, LocalCache};
use crate::template::TemplateKind;

/// Draft shared between the editor and background work such as uploads.
pub type SharedDraft = Arc<tokio::sync::Mutex<DraftStore>>;

/// Receives the outcome of every write-through save.
pub trait DraftObserver: Send + Sync {
    fn save_failed(&self, key: &str, error: &CacheError);

    fn saved(&self, _key: &str) {}

    /// The slot could not be read, so the store will not write to it.
    fn load_failed(&self, _key: &str, _error: &CacheError) {}
}

/// Reports save failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DraftObserver for TracingObserver {
    fn save_failed(&self, key: &str, error: &CacheError) {
        tracing::warn!(
            key = %key,
            error = %error,
            "draft could not be saved locally; changes will not survive a reload"
        );
    }

    fn saved(&self, key: &str) {
        tracing::trace!(key = %key, "draft saved");
    }

    fn load_failed(&self, key: &str, error: &CacheError) {
        tracing::warn!(
            key = %key,
            error = %error,
            "cached draft unreadable; editing a new draft without saving over it"
        );
    }
}

pub struct DraftStore {
    template: TemplateKind,
    cache: Arc<dyn LocalCache>,
    observer: Arc<dyn DraftObserver>,
    draft: Draft,
    last_save_error: Option<String>,
    /// Set when the slot could not be read. Writes are skipped so the
    /// stored draft is never replaced by one the user did not start from.
    detached: Option<String>,
}

impl DraftStore {
    /// Load the cached draft for `template`, or seed a new one.
    pub fn open(template: TemplateKind, cache: Arc<dyn LocalCache>) -> Self {
        Self::with_observer(template, cache, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        template: TemplateKind,
        cache: Arc<dyn LocalCache>,
        observer: Arc<dyn DraftObserver>,
    ) -> Self {
        let key = template.data_key();
        let mut detached = None;
        let cached = match cache.read(&key) {
            Ok(Some(json)) => match serde_json::from_str::<Draft>(&json) {
                Ok(mut draft) => {
                    draft.discard_pending_previews();
                    Some(draft)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "discarding unreadable cached draft");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                observer.load_failed(&key, &e);
                detached = Some(format!("cached draft unreadable: {e}"));
                None
            }
        };

        let restored = cached.is_some();
        let mut store = Self {
            template,
            cache,
            observer,
            draft: cached.unwrap_or_default(),
            last_save_error: detached.clone(),
            detached,
        };

        if restored {
            tracing::debug!(template = %template, draft_id = %store.draft.id, "restored cached draft");
        } else if store.detached.is_none() {
            tracing::debug!(template = %template, draft_id = %store.draft.id, "seeded new draft");
            store.write_through();
        }
        store
    }

    pub fn into_shared(self) -> SharedDraft {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn template(&self) -> TemplateKind {
        self.template
    }

    pub fn get(&self) -> &Draft {
        &self.draft
    }

    pub fn set(&mut self, update: FieldUpdate) -> Result<(), DraftError> {
        self.draft.apply(update)?;
        self.write_through();
        Ok(())
    }

    pub fn add_list_item(&mut self, list: ListField) {
        self.draft.add_item(list);
        self.write_through();
    }

    pub fn remove_list_item(&mut self, list: ListField, index: usize) -> Result<(), DraftError> {
        self.draft.remove_item(list, index)?;
        self.write_through();
        Ok(())
    }

    /// Replace the whole draft, e.g. with one rebuilt from a server record.
    pub fn replace(&mut self, draft: Draft) {
        self.draft = draft;
        self.write_through();
    }

    /// Adopt the identity the server gave this draft.
    pub fn assign_id(&mut self, id: &str) {
        if self.draft.id != id {
            tracing::debug!(template = %self.template, from = %self.draft.id, to = %id, "draft id assigned by server");
            self.draft.id = id.to_string();
            self.write_through();
        }
    }

    /// Drop the cached draft and start over with a new id. This also ends
    /// detached mode.
    pub fn clear(&mut self) {
        self.detached = None;
        if let Err(e) = self.cache.remove(&self.template.data_key()) {
            tracing::warn!(template = %self.template, error = %e, "failed to remove cached draft");
        }
        self.draft = Draft::new();
        self.write_through();
    }

    /// Write the draft now, even when detached.
    pub fn save(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string(&self.draft)
            .map_err(|e| CacheError::Unavailable(format!("draft serialization failed: {e}")))?;
        self.cache.write(&self.template.data_key(), &json)
    }

    /// Error from the most recent save, cleared by the next successful one.
    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    /// Whether the current draft is known to be in the cache.
    pub fn is_durable(&self) -> bool {
        self.last_save_error.is_none()
    }

    fn write_through(&mut self) {
        if let Some(reason) = &self.detached {
            self.last_save_error = Some(reason.clone());
            return;
        }
        let key = self.template.data_key();
        match self.save() {
            Ok(()) => {
                self.last_save_error = None;
                self.observer.saved(&key);
            }
            Err(e) => {
                self.observer.save_failed(&key, &e);
                self.last_save_error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::draft::{HeroField, ImageRef};
    use std::sync::Mutex;

    struct FullCache;

    /// Holds one slot; the first read fails.
    struct FlakyReadCache {
        inner: MemoryCache,
        fail_next_read: Mutex<bool>,
    }

    impl LocalCache for FlakyReadCache {
        fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
            if std::mem::take(&mut *self.fail_next_read.lock().unwrap()) {
                return Err(CacheError::Unavailable("disk busy".to_string()));
            }
            self.inner.read(key)
        }
        fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.inner.write(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.inner.remove(key)
        }
    }

    impl LocalCache for FullCache {
        fn read(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }
        fn write(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("quota exceeded".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        failures: Mutex<Vec<String>>,
    }

    impl DraftObserver for RecordingObserver {
        fn save_failed(&self, key: &str, _error: &CacheError) {
            self.failures.lock().unwrap().push(key.to_string());
        }
    }

    #[test]
    fn test_reopen_restores_same_draft_id() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut store = DraftStore::open(TemplateKind::One, cache.clone());
        store
            .set(FieldUpdate::Hero(HeroField::DevName("Jane".into())))
            .unwrap();
        let id = store.get().id.clone();

        let reopened = DraftStore::open(TemplateKind::One, cache);
        assert_eq!(reopened.get().id, id);
        assert_eq!(reopened.get().hero.dev_name, "Jane");
    }

    #[test]
    fn test_templates_use_separate_slots() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let one = DraftStore::open(TemplateKind::One, cache.clone());
        let two = DraftStore::open(TemplateKind::Two, cache.clone());
        assert_ne!(one.get().id, two.get().id);
        assert!(cache.read("templateOneData").unwrap().is_some());
        assert!(cache.read("templateTwoData").unwrap().is_some());
    }

    #[test]
    fn test_pending_preview_is_not_restored() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut store = DraftStore::open(TemplateKind::One, cache.clone());
        store
            .set(FieldUpdate::Hero(HeroField::HeroImage(ImageRef::Pending {
                preview: "blob:preview/x".into(),
            })))
            .unwrap();

        let reopened = DraftStore::open(TemplateKind::One, cache);
        assert_eq!(reopened.get().hero.hero_image, ImageRef::Empty);
    }

    #[test]
    fn test_corrupt_cache_seeds_new_draft() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        cache.write("templateOneData", "{not json").unwrap();
        let store = DraftStore::open(TemplateKind::One, cache.clone());
        assert_eq!(store.get().list_len(ListField::Skills), 1);
        let cached = cache.read("templateOneData").unwrap().unwrap();
        assert!(serde_json::from_str::<Draft>(&cached).is_ok());
    }

    #[test]
    fn test_write_failure_is_reported_but_mutation_applies() {
        let observer = Arc::new(RecordingObserver::default());
        let mut store =
            DraftStore::with_observer(TemplateKind::One, Arc::new(FullCache), observer.clone());

        store
            .set(FieldUpdate::Hero(HeroField::Title("Engineer".into())))
            .unwrap();
        store.add_list_item(ListField::Skills);

        assert_eq!(store.get().hero.title, "Engineer");
        assert_eq!(store.get().about.skills.len(), 2);
        assert!(!store.is_durable());
        assert!(store.last_save_error().unwrap().contains("quota"));
        // seed + set + add
        assert_eq!(observer.failures.lock().unwrap().len(), 3);
        assert!(store.save().is_err());
    }

    #[test]
    fn test_unreadable_slot_is_not_overwritten() {
        let cache = Arc::new(FlakyReadCache {
            inner: MemoryCache::new(),
            fail_next_read: Mutex::new(false),
        });
        let mut store = DraftStore::open(TemplateKind::One, cache.clone());
        store
            .set(FieldUpdate::Hero(HeroField::DevName("Jane".into())))
            .unwrap();
        let id = store.get().id.clone();

        *cache.fail_next_read.lock().unwrap() = true;
        let mut detached = DraftStore::open(TemplateKind::One, cache.clone());
        assert_ne!(detached.get().id, id);
        assert!(!detached.is_durable());
        assert!(detached.last_save_error().unwrap().contains("disk busy"));
        detached
            .set(FieldUpdate::Hero(HeroField::DevName("Someone else".into())))
            .unwrap();
        assert_eq!(detached.get().hero.dev_name, "Someone else");

        let reopened = DraftStore::open(TemplateKind::One, cache);
        assert_eq!(reopened.get().id, id);
        assert_eq!(reopened.get().hero.dev_name, "Jane");
    }

    #[test]
    fn test_assigned_id_survives_reopen() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut store = DraftStore::open(TemplateKind::One, cache.clone());
        store.assign_id("abc123");
        assert_eq!(store.get().id, "abc123");

        let reopened = DraftStore::open(TemplateKind::One, cache);
        assert_eq!(reopened.get().id, "abc123");
    }

    #[test]
    fn test_clear_mints_new_id() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut store = DraftStore::open(TemplateKind::One, cache);
        let first = store.get().id.clone();
        store.clear();
        assert_ne!(store.get().id, first);
    }

    #[test]
    fn test_rejected_removal_does_not_write() {
        let observer = Arc::new(RecordingObserver::default());
        let mut store =
            DraftStore::with_observer(TemplateKind::One, Arc::new(FullCache), observer.clone());
        let before = observer.failures.lock().unwrap().len();
        assert!(store.remove_list_item(ListField::Companies, 0).is_err());
        assert_eq!(observer.failures.lock().unwrap().len(), before);
    }
}
