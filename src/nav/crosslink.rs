//! Jumping from a shared word to the line it occurs in.

use tracing::{debug, warn};

use super::engine::{NavError, NavOutcome, Navigator};
use crate::service::{DrillService, SharedWord, WordOccurrence, WordQuery};
use crate::text;

impl<S: DrillService> Navigator<S> {
    /// Words occurring in more than one document.
    pub async fn shared_words(&self) -> Result<Vec<SharedWord>, NavError> {
        self.dismiss_error();
        let _in_flight = self.track();
        let result = self.service().shared_words().await.map_err(NavError::from);
        self.settle("shared_words", result)
    }

    /// Every line containing `word`, optionally limited to one document.
    pub async fn find_word(
        &self,
        word: &str,
        document_id: Option<&str>,
    ) -> Result<Vec<WordOccurrence>, NavError> {
        self.dismiss_error();
        let query = WordQuery {
            word: word.to_owned(),
            document_id: document_id.map(str::to_owned),
        };
        let _in_flight = self.track();
        let result = self
            .service()
            .traverse_word(&query)
            .await
            .map_err(NavError::from);
        self.settle("find_word", result)
    }

    /// Selects `document_id` and, when `target_line` is given, opens that line's words
    /// exactly as clicking its line node would.
    ///
    /// A line index past the end of the document stops after the selection.
    pub async fn traverse(
        &self,
        document_id: &str,
        target_line: Option<usize>,
    ) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.traverse_inner(document_id, target_line).await;
        self.settle("traverse", result)
    }

    pub async fn traverse_occurrence(
        &self,
        occurrence: &WordOccurrence,
    ) -> Result<NavOutcome, NavError> {
        let outcome = self
            .traverse(&occurrence.doc_id, Some(occurrence.line_index))
            .await?;

        let state = self.state();
        if outcome == NavOutcome::Applied
            && state.line_index == Some(occurrence.line_index)
            && state.parent_text != occurrence.line_text
        {
            warn!(
                document_id = %occurrence.doc_id,
                line_index = occurrence.line_index,
                expected = %occurrence.line_text,
                resolved = %state.parent_text,
                "cross-link line text differs from locally resolved line"
            );
        }
        Ok(outcome)
    }

    async fn traverse_inner(
        &self,
        document_id: &str,
        target_line: Option<usize>,
    ) -> Result<NavOutcome, NavError> {
        let selected = self.select_document_inner(document_id).await?;
        let Some(line_index) = target_line else {
            return Ok(selected);
        };
        if selected != NavOutcome::Applied {
            return Ok(selected);
        }

        let (token, _in_flight) = self.begin();
        let fetched = self.service().get_document(document_id).await;
        if !self.is_current(token) {
            return Ok(NavOutcome::Superseded);
        }
        let document = fetched?;

        let lines = text::split_lines(&document.paragraph);
        let Some(line_text) = lines.get(line_index) else {
            warn!(
                document_id,
                line_index,
                line_count = lines.len(),
                "cross-link line is out of range; staying on the document"
            );
            return Ok(NavOutcome::Applied);
        };

        let Some(next) = self.state().plan_line_jump(line_index, line_text) else {
            return Ok(NavOutcome::Applied);
        };
        debug!(document_id, line_index, token, "opening cross-linked line");
        self.load(token, next).await
    }
}
