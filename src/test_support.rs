use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::sleep;

use crate::nav::Level;
use crate::service::wire::DrillDownResponse;
use crate::service::{
    DeleteRequest, Document, DocumentSummary, DrillDownRequest, DrillDownResult, DrillService,
    Health, InsertRequest, Metadata, MutationAck, MutationTarget, NewDocument, ReorderRequest,
    ServiceError, SharedWord, WordOccurrence, WordQuery,
};
use crate::text::{self, LINE_DELIMITER, WORD_DELIMITER};

pub const SAMPLE_PARAGRAPH: &str = "A\nB\nC\nD\nE";

const PREVIEW_CHARS: usize = 80;

/// In-memory stand-in for the decomposition service.
///
/// Follows the HTTP service contract: level-1 requests split the stored paragraph,
/// deeper levels split the supplied parent text, mutations rewrite the stored paragraph
/// and reject positions outside the addressed sequence. Failures and response delays
/// can be queued to exercise error and ordering paths.
#[derive(Debug, Default)]
pub struct FakeDrillService {
    inner: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    documents: BTreeMap<String, Document>,
    drill_delays: VecDeque<Duration>,
    drill_failures: VecDeque<(StatusCode, String)>,
    mutation_failures: VecDeque<(StatusCode, String)>,
    drill_requests: Vec<DrillDownRequest>,
    mutation_count: usize,
}

impl FakeDrillService {
    pub fn with_documents<'a>(documents: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let service = Self::default();
        for (id, paragraph) in documents {
            service.put_document(id, paragraph);
        }
        service
    }

    pub fn put_document(&self, id: &str, paragraph: &str) {
        self.lock().documents.insert(
            id.to_owned(),
            Document {
                id: id.to_owned(),
                paragraph: paragraph.to_owned(),
                metadata: Metadata::new(),
            },
        );
    }

    pub fn paragraph(&self, id: &str) -> Option<String> {
        self.lock()
            .documents
            .get(id)
            .map(|document| document.paragraph.clone())
    }

    /// Delays the next not-yet-delayed drill-down response by `delay`.
    pub fn push_drill_delay(&self, delay: Duration) {
        self.lock().drill_delays.push_back(delay);
    }

    pub fn fail_next_drill(&self, status: StatusCode, message: &str) {
        self.lock()
            .drill_failures
            .push_back((status, message.to_owned()));
    }

    pub fn fail_next_mutation(&self, status: StatusCode, message: &str) {
        self.lock()
            .mutation_failures
            .push_back((status, message.to_owned()));
    }

    pub fn drill_requests(&self) -> Vec<DrillDownRequest> {
        self.lock().drill_requests.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().mutation_count
    }

    /// Flow payload for `request`, as the HTTP endpoint would encode it.
    pub fn drill_down_response(
        &self,
        request: &DrillDownRequest,
    ) -> Result<DrillDownResponse, ServiceError> {
        let mut state = self.lock();
        state.drill_requests.push(request.clone());
        if let Some((status, message)) = state.drill_failures.pop_front() {
            return Err(ServiceError::from_status(status, message));
        }

        let document = state.document(&request.document_id)?;
        let delimiter = request
            .delimiter
            .clone()
            .unwrap_or_else(|| text::default_delimiter(request.level).to_owned());
        let parent_text = if request.level == Level::Lines {
            document.paragraph.clone()
        } else {
            request.parent_text.clone()
        };

        let parts = text::split_parts(&parent_text, &delimiter, request.level);
        Ok(DrillDownResponse::from_parts(request, &parent_text, &parts))
    }

    fn mutate(
        &self,
        target: &MutationTarget,
        edit: impl FnOnce(&mut Segments) -> Result<(), ServiceError>,
    ) -> Result<MutationAck, ServiceError> {
        let mut state = self.lock();
        state.mutation_count += 1;
        if let Some((status, message)) = state.mutation_failures.pop_front() {
            return Err(ServiceError::from_status(status, message));
        }

        let document_id = target.document_id.clone();
        let paragraph = state.document(&document_id)?.paragraph.clone();
        let separator = separator_for(target.level);

        let paragraph = match target.level {
            Level::List => {
                return Err(bad_request(format!("Invalid level {}", target.level.as_u8())));
            }
            Level::Lines => edit_sequence(&paragraph, separator, edit)?,
            Level::Words => {
                let line_index = target.parent_index.unwrap_or(0);
                let mut lines = Segments::parse(&paragraph, LINE_DELIMITER);
                let line = lines.get(line_index).ok_or_else(|| {
                    bad_request(format!("Line index {line_index} out of range"))
                })?;
                let edited = edit_sequence(line, separator, edit)?;
                lines.set(line_index, edited);
                lines.into_text()
            }
            Level::Characters => {
                let (line_index, word_index) = match target.line_index {
                    Some(line_index) => (line_index, target.parent_index.unwrap_or(0)),
                    None => (target.parent_index.unwrap_or(0), 0),
                };
                let mut lines = Segments::parse(&paragraph, LINE_DELIMITER);
                let line = lines.get(line_index).ok_or_else(|| {
                    bad_request(format!("Line index {line_index} out of range"))
                })?;
                let mut words = Segments::parse(line, WORD_DELIMITER);
                let word = words.get(word_index).ok_or_else(|| {
                    bad_request(format!("Word index {word_index} out of range"))
                })?;
                let edited = edit_sequence(word, separator, edit)?;
                if edited.is_empty() {
                    words.remove(word_index);
                } else {
                    words.set(word_index, edited);
                }
                lines.set(line_index, words.into_text());
                lines.into_text()
            }
        };

        if let Some(document) = state.documents.get_mut(&document_id) {
            document.paragraph = paragraph.clone();
        }

        Ok(MutationAck {
            status: "ok".to_owned(),
            document_id,
            paragraph,
        })
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FakeState {
    fn document(&self, id: &str) -> Result<&Document, ServiceError> {
        self.documents.get(id).ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl DrillService for FakeDrillService {
    async fn health(&self) -> Result<Health, ServiceError> {
        Ok(Health {
            status: "ok".to_owned(),
            neo4j: false,
            documents: self.lock().documents.len(),
        })
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ServiceError> {
        Ok(self
            .lock()
            .documents
            .values()
            .map(|document| {
                let lines = document
                    .paragraph
                    .split(LINE_DELIMITER)
                    .filter(|line| !line.trim().is_empty())
                    .collect::<Vec<_>>();
                DocumentSummary {
                    id: document.id.clone(),
                    line_count: lines.len(),
                    preview: lines
                        .first()
                        .map(|line| line.chars().take(PREVIEW_CHARS).collect())
                        .unwrap_or_default(),
                    metadata: document.metadata.clone(),
                }
            })
            .collect())
    }

    async fn get_document(&self, document_id: &str) -> Result<Document, ServiceError> {
        self.lock().document(document_id).cloned()
    }

    async fn create_document(&self, document: &NewDocument) -> Result<Document, ServiceError> {
        let mut state = self.lock();
        if state.documents.contains_key(&document.id) {
            return Err(ServiceError::from_status(
                StatusCode::CONFLICT,
                format!("Document '{}' already exists", document.id),
            ));
        }

        let created = Document {
            id: document.id.clone(),
            paragraph: document.paragraph.clone(),
            metadata: document.metadata.clone().unwrap_or_default(),
        };
        state.documents.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), ServiceError> {
        self.lock()
            .documents
            .remove(document_id)
            .map(|_| ())
            .ok_or_else(|| not_found(document_id))
    }

    async fn get_metadata(&self, document_id: &str) -> Result<Metadata, ServiceError> {
        Ok(self.lock().document(document_id)?.metadata.clone())
    }

    async fn update_metadata(
        &self,
        document_id: &str,
        metadata: &Metadata,
    ) -> Result<Metadata, ServiceError> {
        let mut state = self.lock();
        let document = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| not_found(document_id))?;
        document.metadata = metadata.clone();
        Ok(document.metadata.clone())
    }

    async fn drill_down(
        &self,
        request: &DrillDownRequest,
    ) -> Result<DrillDownResult, ServiceError> {
        let delay = self.lock().drill_delays.pop_front();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.drill_down_response(request)?.into_result()
    }

    async fn insert(&self, request: &InsertRequest) -> Result<MutationAck, ServiceError> {
        self.mutate(&request.target, |items| {
            items.insert(request.position, request.value.clone());
            Ok(())
        })
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<MutationAck, ServiceError> {
        self.mutate(&request.target, |items| {
            items.remove(request.position).map(|_| ()).ok_or_else(|| {
                bad_request(format!("Position {} out of range", request.position))
            })
        })
    }

    async fn reorder(&self, request: &ReorderRequest) -> Result<MutationAck, ServiceError> {
        self.mutate(&request.target, |items| {
            items.reorder(request.from_index, request.to_index);
            Ok(())
        })
    }

    async fn shared_words(&self) -> Result<Vec<SharedWord>, ServiceError> {
        let mut index = BTreeMap::<String, Vec<WordOccurrence>>::new();
        for occurrence in self.occurrences(None) {
            let key = normalize_word(occurrence.raw.as_deref().unwrap_or_default());
            index.entry(key).or_default().push(occurrence);
        }

        let mut shared = index
            .into_iter()
            .filter_map(|(word, occurrences)| {
                let documents = occurrences
                    .iter()
                    .map(|occurrence| occurrence.doc_id.clone())
                    .collect::<BTreeSet<_>>();
                (documents.len() > 1).then(|| SharedWord {
                    word,
                    documents: documents.into_iter().collect(),
                    occurrences,
                })
            })
            .collect::<Vec<_>>();
        shared.sort_by(|left, right| {
            right
                .documents
                .len()
                .cmp(&left.documents.len())
                .then_with(|| left.word.cmp(&right.word))
        });
        Ok(shared)
    }

    async fn traverse_word(&self, query: &WordQuery) -> Result<Vec<WordOccurrence>, ServiceError> {
        let wanted = normalize_word(&query.word);
        let found = self
            .occurrences(query.document_id.as_deref())
            .into_iter()
            .filter(|occurrence| {
                occurrence
                    .raw
                    .as_deref()
                    .is_some_and(|raw| normalize_word(raw) == wanted)
            })
            .collect::<Vec<_>>();

        if found.is_empty() {
            return Err(ServiceError::from_status(
                StatusCode::NOT_FOUND,
                format!("Word '{}' not found in any document", query.word),
            ));
        }
        Ok(found)
    }
}

impl FakeDrillService {
    fn occurrences(&self, document_id: Option<&str>) -> Vec<WordOccurrence> {
        let state = self.lock();
        let mut occurrences = Vec::new();
        for document in state.documents.values() {
            if document_id.is_some_and(|wanted| wanted != document.id) {
                continue;
            }
            let lines = text::split_lines(&document.paragraph);
            for (line_index, line_text) in lines.iter().enumerate() {
                for (word_index, raw) in text::split_words(line_text).into_iter().enumerate() {
                    occurrences.push(WordOccurrence {
                        doc_id: document.id.clone(),
                        line_index,
                        line_text: line_text.clone(),
                        word_index: Some(word_index),
                        raw: Some(raw),
                    });
                }
            }
        }
        occurrences
    }
}

fn separator_for(level: Level) -> &'static str {
    match level {
        Level::List | Level::Lines => LINE_DELIMITER,
        Level::Words => WORD_DELIMITER,
        Level::Characters => "",
    }
}

/// Delimited text addressed with the indices [`text::split_parts`] displays.
///
/// Empty segments stay in place so the text keeps its blank lines and repeated
/// spaces, but they are never counted as items.
#[derive(Debug)]
struct Segments {
    parts: Vec<String>,
    delimiter: &'static str,
    items: Vec<usize>,
}

impl Segments {
    fn parse(text: &str, delimiter: &'static str) -> Self {
        let parts = if text.is_empty() {
            Vec::new()
        } else if delimiter.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(delimiter).map(str::to_owned).collect()
        };
        let mut segments = Self {
            parts,
            delimiter,
            items: Vec::new(),
        };
        segments.reindex();
        segments
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<&str> {
        let part = *self.items.get(index)?;
        self.parts.get(part).map(String::as_str)
    }

    fn set(&mut self, index: usize, value: String) {
        if let Some(&part) = self.items.get(index) {
            self.parts[part] = value;
        }
        self.reindex();
    }

    /// Inserts before item `position`; positions past the end append after the last item.
    fn insert(&mut self, position: usize, value: String) {
        let part = match self.items.get(position) {
            Some(&part) => part,
            None => self.items.last().map_or(self.parts.len(), |&last| last + 1),
        };
        self.parts.insert(part, value);
        self.reindex();
    }

    fn remove(&mut self, index: usize) -> Option<String> {
        let part = *self.items.get(index)?;
        let removed = self.parts.remove(part);
        self.reindex();
        Some(removed)
    }

    /// Moves item `from` to `to`; out-of-range indices leave the text unchanged.
    fn reorder(&mut self, from: usize, to: usize) {
        if from >= self.len() || to >= self.len() {
            return;
        }
        let mut values = self
            .items
            .iter()
            .map(|&part| std::mem::take(&mut self.parts[part]))
            .collect::<Vec<_>>();
        let moved = values.remove(from);
        values.insert(to, moved);
        for (&part, value) in self.items.iter().zip(values) {
            self.parts[part] = value;
        }
    }

    fn into_text(self) -> String {
        self.parts.join(self.delimiter)
    }

    fn reindex(&mut self) {
        self.items = self
            .parts
            .iter()
            .enumerate()
            .filter(|(_, part)| !part.is_empty())
            .map(|(index, _)| index)
            .collect();
    }
}

fn edit_sequence(
    text: &str,
    delimiter: &'static str,
    edit: impl FnOnce(&mut Segments) -> Result<(), ServiceError>,
) -> Result<String, ServiceError> {
    let mut items = Segments::parse(text, delimiter);
    edit(&mut items)?;
    Ok(items.into_text())
}

fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

fn not_found(document_id: &str) -> ServiceError {
    ServiceError::from_status(
        StatusCode::NOT_FOUND,
        format!("Document '{document_id}' not found"),
    )
}

fn bad_request(message: String) -> ServiceError {
    ServiceError::from_status(StatusCode::BAD_REQUEST, message)
}
