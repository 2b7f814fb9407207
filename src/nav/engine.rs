use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Level, NavigationState, RequestTokens};
use crate::service::{
    DocumentSummary, DrillDownResult, DrillService, Health, Metadata, NewDocument, Node,
    ServiceError,
};
use crate::text::{MIN_PARAGRAPH_LINES, count_content_lines};

/// Problems caught before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no document is selected")]
    NoActiveDocument,

    #[error("document id cannot be empty")]
    EmptyDocumentId,

    #[error("paragraph needs at least {required} non-empty lines, found {found}")]
    TooFewLines { found: usize, required: usize },

    #[error("value cannot be empty")]
    EmptyValue,

    #[error("cannot resolve the {missing} addressed at level {level}")]
    UnresolvedScope { level: Level, missing: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum NavError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl NavError {
    /// True when the service rejected a position outside the addressed sequence.
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Service(error) if error.is_range())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavOutcome {
    /// The new state and view were applied.
    Applied,
    /// The intent was a no-op; nothing was requested.
    Unchanged,
    /// A newer navigation request was issued while this one was in flight.
    Superseded,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigatorSnapshot {
    pub state: NavigationState,
    pub view: DrillDownResult,
    pub error: Option<String>,
    pub loading: bool,
}

#[derive(Debug, Default)]
struct Session {
    state: NavigationState,
    view: DrillDownResult,
    error: Option<String>,
    in_flight: usize,
    tokens: RequestTokens,
}

impl Session {
    fn tear_down(&mut self) {
        self.tokens.issue();
        self.state = NavigationState::default();
        self.view = DrillDownResult::default();
    }
}

/// Decrements the in-flight counter when the request it tracks finishes, however it finishes.
pub(super) struct InFlight<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        session.in_flight = session.in_flight.saturating_sub(1);
    }
}

/// Owns the navigation state and the displayed nodes, and drives the decomposition service.
///
/// All actions take `&self` so a caller may start a second intent before the first
/// resolves. Navigation responses are applied only if no newer navigation request was
/// issued in the meantime; every failure is written to the shared error banner and
/// leaves the last good state in place.
pub struct Navigator<S> {
    service: S,
    session: Mutex<Session>,
}

impl<S: DrillService> Navigator<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn snapshot(&self) -> NavigatorSnapshot {
        let session = self.lock();
        NavigatorSnapshot {
            state: session.state.clone(),
            view: session.view.clone(),
            error: session.error.clone(),
            loading: session.in_flight > 0,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.lock().state.clone()
    }

    pub fn view(&self) -> DrillDownResult {
        self.lock().view.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    /// Advisory only; never blocks further intents.
    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// Number of items in the displayed sequence.
    pub fn item_count(&self) -> usize {
        self.lock().view.item_count()
    }

    pub fn breadcrumbs(&self) -> Vec<String> {
        self.lock()
            .state
            .breadcrumbs()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub async fn select_document(&self, document_id: &str) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.select_document_inner(document_id).await;
        self.settle("select_document", result)
    }

    pub async fn drill_into(&self, node: &Node) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.drill_into_inner(node).await;
        self.settle("drill_into", result)
    }

    /// Drills into the displayed item at `index`; a missing item is a no-op.
    pub async fn drill_into_index(&self, index: usize) -> Result<NavOutcome, NavError> {
        let node = self.lock().view.item_at(index).cloned();
        match node {
            Some(node) => self.drill_into(&node).await,
            None => {
                debug!(index, "no displayed item at index; ignoring drill");
                Ok(NavOutcome::Unchanged)
            }
        }
    }

    /// Jumps back to trail entry `trail_index`; any negative index returns to the document list.
    pub async fn navigate_to(&self, trail_index: isize) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.navigate_to_inner(trail_index).await;
        self.settle("navigate_to", result)
    }

    pub async fn return_to_list(&self) -> Result<NavOutcome, NavError> {
        self.navigate_to(-1).await
    }

    pub async fn refresh_current_level(&self) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.refresh_inner().await;
        self.settle("refresh_current_level", result)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>, NavError> {
        self.dismiss_error();
        let _in_flight = self.track();
        let result = self.service.list_documents().await.map_err(NavError::from);
        self.settle("list_documents", result)
    }

    pub async fn create_document(
        &self,
        document_id: &str,
        paragraph: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), NavError> {
        self.dismiss_error();
        let result = self
            .create_document_inner(document_id, paragraph, metadata)
            .await;
        self.settle("create_document", result)
    }

    /// Deletes a document; deleting the selected one tears the navigation state down.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), NavError> {
        self.dismiss_error();
        let result = self.delete_document_inner(document_id).await;
        self.settle("delete_document", result)
    }

    pub async fn check_health(&self) -> Result<Health, NavError> {
        let result = self.service.health().await.map_err(NavError::from);
        match &result {
            Ok(health) => info!(neo4j = health.neo4j, documents = health.documents, "service health"),
            Err(error) => warn!(error = %error, "service health check failed"),
        }
        result
    }

    pub(super) async fn select_document_inner(
        &self,
        document_id: &str,
    ) -> Result<NavOutcome, NavError> {
        let (token, _in_flight) = self.begin();
        let fetched = self.service.get_document(document_id).await;
        if !self.is_current(token) {
            return Ok(NavOutcome::Superseded);
        }
        let document = fetched?;

        let next = NavigationState::selected(document_id, document.paragraph);
        debug!(document_id, token, "selecting document");
        self.load(token, next).await
    }

    async fn drill_into_inner(&self, node: &Node) -> Result<NavOutcome, NavError> {
        let Some(next) = self.lock().state.plan_drill(node) else {
            debug!(node_id = %node.id, "drill ignored for root, leaf or deepest level");
            return Ok(NavOutcome::Unchanged);
        };

        let (token, _in_flight) = self.begin();
        debug!(node_id = %node.id, level = next.level.as_u8(), token, "drilling into node");
        self.load(token, next).await
    }

    async fn navigate_to_inner(&self, trail_index: isize) -> Result<NavOutcome, NavError> {
        let Ok(trail_index) = usize::try_from(trail_index) else {
            self.lock().tear_down();
            debug!("returned to document list");
            return Ok(NavOutcome::Applied);
        };

        let Some(next) = self.lock().state.plan_navigate(trail_index) else {
            return Ok(NavOutcome::Unchanged);
        };

        let (token, _in_flight) = self.begin();
        debug!(trail_index, level = next.level.as_u8(), token, "navigating back");
        self.load(token, next).await
    }

    pub(super) async fn refresh_inner(&self) -> Result<NavOutcome, NavError> {
        let current = self.state();
        let Some(document_id) = current.document_id.clone() else {
            return Ok(NavOutcome::Unchanged);
        };

        let (token, _in_flight) = self.begin();
        let fetched = self.service.get_document(&document_id).await;
        if !self.is_current(token) {
            return Ok(NavOutcome::Superseded);
        }
        let document = fetched?;

        let Some(next) = current.plan_refresh(&document.paragraph) else {
            return Ok(NavOutcome::Unchanged);
        };
        debug!(document_id = %document_id, level = next.level.as_u8(), token, "refreshing level");
        self.load(token, next).await
    }

    async fn create_document_inner(
        &self,
        document_id: &str,
        paragraph: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), NavError> {
        let document = validate_new_document(document_id, paragraph, metadata)?;
        let _in_flight = self.track();
        self.service.create_document(&document).await?;
        info!(document_id = %document.id, "created document");
        Ok(())
    }

    async fn delete_document_inner(&self, document_id: &str) -> Result<(), NavError> {
        let _in_flight = self.track();
        self.service.delete_document(document_id).await?;
        info!(document_id, "deleted document");

        let mut session = self.lock();
        if session.state.document_id.as_deref() == Some(document_id) {
            session.tear_down();
        }
        Ok(())
    }

    /// Sends the request displaying `next` and applies it if `token` is still the latest.
    pub(super) async fn load(
        &self,
        token: u64,
        next: NavigationState,
    ) -> Result<NavOutcome, NavError> {
        let Some(request) = next.request() else {
            return Ok(NavOutcome::Unchanged);
        };
        let result = self.service.drill_down(&request).await;

        let mut session = self.lock();
        if !session.tokens.is_current(token) {
            debug!(
                token,
                latest = session.tokens.latest(),
                "discarding superseded navigation response"
            );
            return Ok(NavOutcome::Superseded);
        }

        let view = result?;
        session.state = next;
        session.view = view;
        Ok(NavOutcome::Applied)
    }

    /// Issues a navigation token and marks a request in flight.
    pub(super) fn begin(&self) -> (u64, InFlight<'_>) {
        let mut session = self.lock();
        session.in_flight += 1;
        let token = session.tokens.issue();
        (token, InFlight { session: &self.session })
    }

    /// Marks a request in flight without invalidating pending navigation.
    pub(super) fn track(&self) -> InFlight<'_> {
        self.lock().in_flight += 1;
        InFlight { session: &self.session }
    }

    pub(super) fn is_current(&self, token: u64) -> bool {
        self.lock().tokens.is_current(token)
    }

    pub(super) fn settle<T>(
        &self,
        action: &'static str,
        result: Result<T, NavError>,
    ) -> Result<T, NavError> {
        if let Err(error) = &result {
            if error.is_range() {
                info!(action, error = %error, "service rejected an out-of-range position");
            } else {
                warn!(action, error = %error, "navigator action failed");
            }
            self.lock().error = Some(error.to_string());
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side checks a new document must pass before it is submitted.
pub fn validate_new_document(
    document_id: &str,
    paragraph: &str,
    metadata: Option<Metadata>,
) -> Result<NewDocument, ValidationError> {
    let document_id = document_id.trim();
    if document_id.is_empty() {
        return Err(ValidationError::EmptyDocumentId);
    }

    let found = count_content_lines(paragraph);
    if found < MIN_PARAGRAPH_LINES {
        return Err(ValidationError::TooFewLines {
            found,
            required: MIN_PARAGRAPH_LINES,
        });
    }

    Ok(NewDocument {
        id: document_id.to_owned(),
        paragraph: paragraph.to_owned(),
        metadata: metadata.filter(|metadata| !metadata.is_empty()),
    })
}

/// Metadata from a JSON value; anything but an object is rejected.
pub fn metadata_from_value(value: Value) -> Option<Metadata> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
