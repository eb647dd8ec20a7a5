/**
 * Submission Orchestrator
 * Validates a draft, re-verifies the session and writes the record
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::types::PortfolioRecord;
use crate::api::{ApiError, CreateOutcome, CustomUrlOutcome, PortfolioApi};
use crate::cache::LocalCache;
use crate::draft::Draft;
use crate::reconcile::{from_persistence, to_persistence};
use crate::routing::sign_in_redirect;
use crate::session::SessionGate;
use crate::template::TemplateKind;

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created,
    Updated,
    /// The backend already held a record for this user and template.
    AlreadyExisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSuccess {
    pub outcome: SubmitOutcome,
    pub portfolio_id: String,
    pub custom_url: Option<String>,
    /// View route to navigate to.
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitFailure {
    #[error("please fill in: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },

    /// The draft stays cached; `redirect` returns the user to the editor.
    #[error("session expired, please sign in again")]
    AuthExpired { redirect: String },

    #[error("a submission is already in progress")]
    InProgress,

    #[error("{message}")]
    Server { status: Option<u16>, message: String },

    #[error("something went wrong, please try again")]
    Network,

    #[error("a portfolio already exists but could not be located")]
    ConflictUnresolved,
}

/// Identity of the last record written for a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredIdentity {
    pub portfolio_id: Option<String>,
    pub custom_url: Option<String>,
}

// ============================================================================
// Validation
// ============================================================================

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Labels of required fields that are blank, in form order.
///
/// Only the first project needs a name and a description; a draft without
/// projects reports both.
pub fn validate(draft: &Draft) -> Vec<String> {
    let mut missing = Vec::new();
    let mut require = |label: &str, value_blank: bool| {
        if value_blank {
            missing.push(label.to_string());
        }
    };

    require("Hero - devName", blank(&draft.hero.dev_name));
    require("Hero - title", blank(&draft.hero.title));
    require("Hero - description", blank(&draft.hero.description));
    require("About - title", blank(&draft.about.title));
    require("About - subtitle", blank(&draft.about.subtitle));
    require("About - description", blank(&draft.about.description));
    let first = draft.projects.first();
    require("Projects - name", first.map_or(true, |p| blank(&p.name)));
    require(
        "Projects - description",
        first.map_or(true, |p| blank(&p.description)),
    );
    require("Contact - email", blank(&draft.contact.email));

    missing
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Resets the in-flight flag when the submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SubmissionOrchestrator {
    template: TemplateKind,
    gate: Arc<SessionGate>,
    api: Arc<dyn PortfolioApi>,
    cache: Arc<dyn LocalCache>,
    /// Set once a fetch found a stored record; switches submit to update.
    existing_id: tokio::sync::Mutex<Option<String>>,
    in_flight: AtomicBool,
}

impl SubmissionOrchestrator {
    pub fn new(
        template: TemplateKind,
        gate: Arc<SessionGate>,
        api: Arc<dyn PortfolioApi>,
        cache: Arc<dyn LocalCache>,
    ) -> Self {
        Self {
            template,
            gate,
            api,
            cache,
            existing_id: tokio::sync::Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn template(&self) -> TemplateKind {
        self.template
    }

    pub async fn is_update(&self) -> bool {
        self.existing_id.lock().await.is_some()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Persist `draft` to the backend. At most one create or update call is
    /// made per invocation, and none when validation fails.
    pub async fn submit(&self, draft: &Draft) -> Result<SubmitSuccess, SubmitFailure> {
        let _guard = self.try_begin().ok_or(SubmitFailure::InProgress)?;

        let missing = validate(draft);
        if !missing.is_empty() {
            tracing::debug!(template = %self.template, ?missing, "submission rejected by validation");
            return Err(SubmitFailure::Validation { missing });
        }

        let token = self.verified_token().await?;
        let input = to_persistence(draft, self.template);
        let existing = self.existing_id.lock().await.clone();

        match existing {
            Some(id) => {
                tracing::info!(template = %self.template, portfolio_id = %id, "updating portfolio");
                let record = self
                    .api
                    .update(&token, self.template, &id, &input)
                    .await
                    .map_err(|e| self.failure(e))?;
                let id = if record.id.is_empty() { id } else { record.id };
                Ok(self.finish(SubmitOutcome::Updated, id, record.content.custom_url))
            }
            None => {
                tracing::info!(template = %self.template, draft_id = %draft.id, "creating portfolio");
                let outcome = self
                    .api
                    .create(&token, self.template, &input)
                    .await
                    .map_err(|e| self.failure(e))?;
                match outcome {
                    CreateOutcome::Created(record) => {
                        let record = self.require_id(record)?;
                        Ok(self.finish(
                            SubmitOutcome::Created,
                            record.id,
                            record.content.custom_url,
                        ))
                    }
                    CreateOutcome::AlreadyExists {
                        portfolio_id: Some(id),
                    } => Ok(self.finish(SubmitOutcome::AlreadyExisted, id, None)),
                    CreateOutcome::AlreadyExists { portfolio_id: None } => {
                        self.resolve_conflict(&token).await
                    }
                }
            }
        }
    }

    /// Fetch the stored record for this template. When one exists, later
    /// submissions update it.
    pub async fn load_existing(&self) -> Result<Option<Draft>, SubmitFailure> {
        let token = self.gate.token().await.ok_or_else(|| self.auth_expired())?;
        let record = self
            .api
            .fetch(&token, self.template)
            .await
            .map_err(|e| self.failure(e))?;

        let Some(record) = record.filter(|r| !r.id.is_empty()) else {
            return Ok(None);
        };

        *self.existing_id.lock().await = Some(record.id.clone());
        self.persist_identity(&record.id, record.content.custom_url.as_deref());
        tracing::debug!(template = %self.template, portfolio_id = %record.id, "loaded stored portfolio");
        Ok(Some(from_persistence(&record)))
    }

    /// Reserve a public slug for this template's record.
    pub async fn claim_custom_url(&self, slug: &str) -> Result<CustomUrlOutcome, SubmitFailure> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(SubmitFailure::Validation {
                missing: vec!["Custom URL".to_string()],
            });
        }
        let token = self.gate.token().await.ok_or_else(|| self.auth_expired())?;
        let outcome = self
            .api
            .claim_custom_url(&token, self.template, slug)
            .await
            .map_err(|e| self.failure(e))?;

        match &outcome {
            CustomUrlOutcome::Assigned(url) => {
                if let Err(e) = self.cache.write(&self.template.custom_url_key(), url) {
                    tracing::warn!(error = %e, "failed to cache custom url");
                }
                tracing::info!(template = %self.template, custom_url = %url, "custom url assigned");
            }
            CustomUrlOutcome::Taken => {
                tracing::debug!(template = %self.template, slug = %slug, "custom url taken");
            }
        }
        Ok(outcome)
    }

    pub fn stored_identity(&self) -> StoredIdentity {
        let read = |key: String| match self.cache.read(&key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read stored identity");
                None
            }
        };
        StoredIdentity {
            portfolio_id: read(self.template.portfolio_id_key()),
            custom_url: read(self.template.custom_url_key()),
        }
    }

    // ---- private helpers ----

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    async fn verified_token(&self) -> Result<String, SubmitFailure> {
        if !self.gate.check_auth_state().await {
            tracing::info!(template = %self.template, "session not valid at submit; redirecting to sign-in");
            return Err(self.auth_expired());
        }
        self.gate.token().await.ok_or_else(|| self.auth_expired())
    }

    fn auth_expired(&self) -> SubmitFailure {
        SubmitFailure::AuthExpired {
            redirect: sign_in_redirect(&self.template.edit_route()),
        }
    }

    fn failure(&self, err: ApiError) -> SubmitFailure {
        tracing::warn!(template = %self.template, error = %err, "portfolio request failed");
        if err.is_unauthorized() {
            return self.auth_expired();
        }
        if err.is_network() {
            return SubmitFailure::Network;
        }
        let status = err.status();
        let message = match err {
            ApiError::Status { message, .. } | ApiError::Decode(message) => message,
            other => other.to_string(),
        };
        SubmitFailure::Server { status, message }
    }

    fn require_id(&self, record: PortfolioRecord) -> Result<PortfolioRecord, SubmitFailure> {
        if record.id.is_empty() {
            Err(SubmitFailure::Server {
                status: None,
                message: "backend returned a portfolio without an id".to_string(),
            })
        } else {
            Ok(record)
        }
    }

    /// 409 without an id: look the record up instead.
    async fn resolve_conflict(&self, token: &str) -> Result<SubmitSuccess, SubmitFailure> {
        match self.api.fetch(token, self.template).await {
            Ok(Some(record)) if !record.id.is_empty() => Ok(self.finish(
                SubmitOutcome::AlreadyExisted,
                record.id,
                record.content.custom_url,
            )),
            Ok(_) => Err(SubmitFailure::ConflictUnresolved),
            Err(e) => {
                tracing::warn!(template = %self.template, error = %e, "could not locate conflicting portfolio");
                Err(SubmitFailure::ConflictUnresolved)
            }
        }
    }

    fn finish(
        &self,
        outcome: SubmitOutcome,
        portfolio_id: String,
        custom_url: Option<String>,
    ) -> SubmitSuccess {
        self.persist_identity(&portfolio_id, custom_url.as_deref());
        tracing::info!(
            template = %self.template,
            portfolio_id = %portfolio_id,
            ?outcome,
            "portfolio submitted"
        );
        SubmitSuccess {
            outcome,
            redirect: self.template.view_route(&portfolio_id),
            portfolio_id,
            custom_url,
        }
    }

    fn persist_identity(&self, portfolio_id: &str, custom_url: Option<&str>) {
        if let Err(e) = self.cache.write(&self.template.portfolio_id_key(), portfolio_id) {
            tracing::warn!(error = %e, "failed to cache portfolio id");
        }
        if let Some(url) = custom_url.filter(|u| !u.is_empty()) {
            if let Err(e) = self.cache.write(&self.template.custom_url_key(), url) {
                tracing::warn!(error = %e, "failed to cache custom url");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::PortfolioInput;
    use crate::cache::MemoryCache;
    use crate::draft::ListField;
    use crate::session::tests::{signed_in_gate, user, FakeAuth};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Fetch,
        Create(PortfolioInput),
        Update(String),
        Claim(String),
    }

    #[derive(Default)]
    struct FakePortfolios {
        calls: Mutex<Vec<Call>>,
        creates: Mutex<VecDeque<Result<CreateOutcome, ApiError>>>,
        fetched: Mutex<Option<PortfolioRecord>>,
        delay: Duration,
    }

    impl FakePortfolios {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn record(id: &str) -> PortfolioRecord {
        PortfolioRecord {
            id: id.to_string(),
            ..PortfolioRecord::default()
        }
    }

    #[async_trait]
    impl PortfolioApi for FakePortfolios {
        async fn fetch(
            &self,
            _token: &str,
            _template: TemplateKind,
        ) -> Result<Option<PortfolioRecord>, ApiError> {
            self.calls.lock().unwrap().push(Call::Fetch);
            Ok(self.fetched.lock().unwrap().clone())
        }

        async fn create(
            &self,
            _token: &str,
            _template: TemplateKind,
            input: &PortfolioInput,
        ) -> Result<CreateOutcome, ApiError> {
            self.calls.lock().unwrap().push(Call::Create(input.clone()));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.creates.lock().unwrap().pop_front();
            next.unwrap_or(Ok(CreateOutcome::Created(record("abc123"))))
        }

        async fn update(
            &self,
            _token: &str,
            _template: TemplateKind,
            id: &str,
            _input: &PortfolioInput,
        ) -> Result<PortfolioRecord, ApiError> {
            self.calls.lock().unwrap().push(Call::Update(id.to_string()));
            Ok(record(id))
        }

        async fn claim_custom_url(
            &self,
            _token: &str,
            _template: TemplateKind,
            slug: &str,
        ) -> Result<CustomUrlOutcome, ApiError> {
            self.calls.lock().unwrap().push(Call::Claim(slug.to_string()));
            if slug == "taken" {
                Ok(CustomUrlOutcome::Taken)
            } else {
                Ok(CustomUrlOutcome::Assigned(slug.to_string()))
            }
        }
    }

    fn complete_draft() -> Draft {
        let mut draft = Draft::new();
        draft.hero.dev_name = "Jane".into();
        draft.hero.title = "Jane Doe".into();
        draft.hero.description = "...".into();
        draft.about.title = "About".into();
        draft.about.subtitle = "Engineer".into();
        draft.about.description = "Builds things".into();
        draft.projects[0].name = "Site".into();
        draft.projects[0].description = "A site".into();
        draft.contact.email = "jane@x.com".into();
        draft
    }

    async fn orchestrator(
        fake: Arc<FakePortfolios>,
        auth: FakeAuth,
    ) -> (SubmissionOrchestrator, Arc<MemoryCache>) {
        let (gate, _) = signed_in_gate(auth).await;
        let cache = Arc::new(MemoryCache::new());
        let orch = SubmissionOrchestrator::new(TemplateKind::One, gate, fake, cache.clone());
        (orch, cache)
    }

    #[test]
    fn test_validate_complete_draft() {
        assert!(validate(&complete_draft()).is_empty());
    }

    #[test]
    fn test_validate_reports_in_form_order() {
        let mut draft = complete_draft();
        draft.contact.email = "  ".into();
        draft.hero.title.clear();
        assert_eq!(validate(&draft), vec!["Hero - title", "Contact - email"]);

        draft.projects.clear();
        assert!(validate(&draft).contains(&"Projects - name".to_string()));
    }

    #[test]
    fn test_validate_ignores_blank_trailing_projects() {
        let mut draft = complete_draft();
        draft.add_item(ListField::Projects);
        assert_eq!(draft.projects.len(), 2);
        assert!(validate(&draft).is_empty());

        draft.projects[0].description.clear();
        assert_eq!(validate(&draft), vec!["Projects - description"]);
    }

    #[tokio::test]
    async fn test_submit_creates_and_stores_id() {
        let fake = Arc::new(FakePortfolios::default());
        let (orch, cache) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;

        let success = orch.submit(&complete_draft()).await.unwrap();
        assert_eq!(success.outcome, SubmitOutcome::Created);
        assert_eq!(success.portfolio_id, "abc123");
        assert_eq!(success.redirect, "/templates/template1/view/abc123");
        assert_eq!(
            cache.read("templateOnePortfolioId").unwrap().as_deref(),
            Some("abc123")
        );

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Create(input) => {
                assert_eq!(input.brand_name, "Jane");
                assert_eq!(input.template_type, "template1");
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_email_makes_no_network_call() {
        let fake = Arc::new(FakePortfolios::default());
        let (orch, _) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;
        let mut draft = complete_draft();
        draft.contact.email.clear();

        let err = orch.submit(&draft).await.unwrap_err();
        assert_eq!(
            err,
            SubmitFailure::Validation {
                missing: vec!["Contact - email".to_string()]
            }
        );
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_submit_resolves_through_conflict() {
        let fake = Arc::new(FakePortfolios::default());
        fake.creates
            .lock()
            .unwrap()
            .push_back(Ok(CreateOutcome::Created(record("abc123"))));
        fake.creates
            .lock()
            .unwrap()
            .push_back(Ok(CreateOutcome::AlreadyExists {
                portfolio_id: Some("abc123".into()),
            }));
        let (orch, _) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;
        let draft = complete_draft();

        orch.submit(&draft).await.unwrap();
        let second = orch.submit(&draft).await.unwrap();
        assert_eq!(second.outcome, SubmitOutcome::AlreadyExisted);
        assert_eq!(second.redirect, "/templates/template1/view/abc123");
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_conflict_without_id_looks_record_up() {
        let fake = Arc::new(FakePortfolios::default());
        fake.creates
            .lock()
            .unwrap()
            .push_back(Ok(CreateOutcome::AlreadyExists { portfolio_id: None }));
        *fake.fetched.lock().unwrap() = Some(record("def456"));
        let (orch, _) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;

        let success = orch.submit(&complete_draft()).await.unwrap();
        assert_eq!(success.portfolio_id, "def456");
    }

    #[tokio::test]
    async fn test_conflict_unresolved_when_lookup_finds_nothing() {
        let fake = Arc::new(FakePortfolios::default());
        fake.creates
            .lock()
            .unwrap()
            .push_back(Ok(CreateOutcome::AlreadyExists { portfolio_id: None }));
        let (orch, _) = orchestrator(fake, FakeAuth::checking(Ok(user()))).await;
        assert_eq!(
            orch.submit(&complete_draft()).await.unwrap_err(),
            SubmitFailure::ConflictUnresolved
        );
    }

    #[tokio::test]
    async fn test_server_message_is_surfaced() {
        let fake = Arc::new(FakePortfolios::default());
        fake.creates.lock().unwrap().push_back(Err(ApiError::Status {
            status: 500,
            message: "database unavailable".into(),
        }));
        let (orch, _) = orchestrator(fake, FakeAuth::checking(Ok(user()))).await;
        let err = orch.submit(&complete_draft()).await.unwrap_err();
        assert_eq!(err.to_string(), "database unavailable");
        // The gate is released after a failure.
        assert!(!orch.is_submitting());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_network_failure() {
        let fake = Arc::new(FakePortfolios::default());
        fake.creates.lock().unwrap().push_back(Err(ApiError::Timeout));
        let (orch, _) = orchestrator(fake, FakeAuth::checking(Ok(user()))).await;
        assert_eq!(
            orch.submit(&complete_draft()).await.unwrap_err(),
            SubmitFailure::Network
        );
    }

    #[tokio::test]
    async fn test_expired_session_redirects_with_return_path() {
        let fake = Arc::new(FakePortfolios::default());
        let auth = FakeAuth::checking(Err(ApiError::Status {
            status: 401,
            message: "expired".into(),
        }));
        let (orch, _) = orchestrator(fake.clone(), auth).await;

        let err = orch.submit(&complete_draft()).await.unwrap_err();
        assert_eq!(
            err,
            SubmitFailure::AuthExpired {
                redirect: "/signin?redirect=%2Ftemplates%2Ftemplate1%2Fedit".into()
            }
        );
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submit_is_rejected() {
        let fake = Arc::new(FakePortfolios {
            delay: Duration::from_secs(1),
            ..FakePortfolios::default()
        });
        let (orch, _) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;
        let draft = complete_draft();

        let (first, second) = tokio::join!(orch.submit(&draft), orch.submit(&draft));
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), SubmitFailure::InProgress);
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_loaded_record_switches_to_update() {
        let fake = Arc::new(FakePortfolios::default());
        let mut stored = record("abc123");
        stored.content.brand_name = "Jane".into();
        stored.content.custom_url = Some("jane".into());
        *fake.fetched.lock().unwrap() = Some(stored);
        let (orch, _) = orchestrator(fake.clone(), FakeAuth::checking(Ok(user()))).await;

        let draft = orch.load_existing().await.unwrap().unwrap();
        assert_eq!(draft.hero.dev_name, "Jane");
        assert!(orch.is_update().await);
        assert_eq!(
            orch.stored_identity(),
            StoredIdentity {
                portfolio_id: Some("abc123".into()),
                custom_url: Some("jane".into()),
            }
        );

        let success = orch.submit(&complete_draft()).await.unwrap();
        assert_eq!(success.outcome, SubmitOutcome::Updated);
        assert_eq!(
            fake.calls(),
            vec![Call::Fetch, Call::Update("abc123".into())]
        );
    }

    #[tokio::test]
    async fn test_claim_custom_url() {
        let fake = Arc::new(FakePortfolios::default());
        let (orch, cache) = orchestrator(fake, FakeAuth::checking(Ok(user()))).await;

        assert_eq!(
            orch.claim_custom_url("taken").await.unwrap(),
            CustomUrlOutcome::Taken
        );
        assert_eq!(
            orch.claim_custom_url("jane-doe").await.unwrap(),
            CustomUrlOutcome::Assigned("jane-doe".into())
        );
        assert_eq!(
            cache.read("templateOneCustomUrl").unwrap().as_deref(),
            Some("jane-doe")
        );
    }
}
