//! One template editor wired from [`ClientConfig`].

use std::sync::Arc;

use crate::api::{ApiClient, PortfolioApi};
use crate::cache::{CacheError, FileCache, LocalCache};
use crate::config::ClientConfig;
use crate::draft::{DraftStore, SharedDraft};
use crate::routing::{NavigationGuard, RoutePolicy};
use crate::session::SessionGate;
use crate::submit::{SubmissionOrchestrator, SubmitFailure, SubmitSuccess};
use crate::template::TemplateKind;
use crate::upload::{AssetHost, HttpAssetHost, ImageUploadAdapter};

pub struct Editor {
    template: TemplateKind,
    pub session: Arc<SessionGate>,
    pub draft: SharedDraft,
    pub submission: SubmissionOrchestrator,
    pub uploads: ImageUploadAdapter,
    pub navigation: NavigationGuard,
}

impl Editor {
    /// File-backed cache and HTTP clients, as configured.
    pub fn open(config: &ClientConfig, template: TemplateKind) -> Result<Self, CacheError> {
        let cache: Arc<dyn LocalCache> = Arc::new(FileCache::open(&config.cache_dir)?);
        let client = Arc::new(ApiClient::new(config.api_url.clone()));
        let session = Arc::new(SessionGate::restore(
            client.clone(),
            cache.clone(),
            config.verify_timeout,
        ));

        let mut host = HttpAssetHost::new(config.upload_url.clone()).with_session(session.clone());
        if let Some(preset) = &config.upload_preset {
            host = host.with_preset(preset.clone());
        }

        Ok(Self::with_parts(
            config,
            template,
            session,
            client,
            Arc::new(host),
            cache,
        ))
    }

    pub fn with_parts(
        config: &ClientConfig,
        template: TemplateKind,
        session: Arc<SessionGate>,
        portfolios: Arc<dyn PortfolioApi>,
        host: Arc<dyn AssetHost>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        let draft = DraftStore::open(template, cache.clone()).into_shared();
        Self {
            template,
            submission: SubmissionOrchestrator::new(template, session.clone(), portfolios, cache),
            uploads: ImageUploadAdapter::new(draft.clone(), host),
            navigation: NavigationGuard::new(
                session.clone(),
                RoutePolicy::default(),
                config.route_debounce,
            ),
            session,
            draft,
        }
    }

    pub fn template(&self) -> TemplateKind {
        self.template
    }

    /// Submit a snapshot of the current draft. On success the draft takes
    /// the server's id.
    pub async fn submit(&self) -> Result<SubmitSuccess, SubmitFailure> {
        let draft = self.draft.lock().await.get().clone();
        let success = self.submission.submit(&draft).await?;
        self.draft.lock().await.assign_id(&success.portfolio_id);
        Ok(success)
    }

    /// Replace the draft with the stored record, if there is one.
    pub async fn load_existing(&self) -> Result<bool, SubmitFailure> {
        match self.submission.load_existing().await? {
            Some(draft) => {
                self.draft.lock().await.replace(draft);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Release outstanding image previews.
    pub fn close(&self) -> usize {
        self.uploads.close()
    }
}
