//! Insert, delete and reorder, addressed at exactly the sequence on screen.

use tracing::{debug, info};

use super::engine::{NavError, NavOutcome, Navigator, ValidationError};
use super::{Level, NavigationState};
use crate::service::{DeleteRequest, DrillService, InsertRequest, MutationTarget, ReorderRequest};

/// The editable sequence addressed by `(level, parentIndex, lineIndex)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationScope {
    /// The document's own lines.
    Lines,
    /// Words of line `line`.
    Words { line: usize },
    /// Characters of word `word` within line `line`.
    Characters { line: usize, word: usize },
}

impl MutationScope {
    pub fn resolve(state: &NavigationState) -> Result<Self, ValidationError> {
        if state.document_id.is_none() {
            return Err(ValidationError::NoActiveDocument);
        }

        match state.level {
            Level::List => Err(ValidationError::NoActiveDocument),
            Level::Lines => Ok(Self::Lines),
            Level::Words => {
                let line = state.line_index.ok_or(ValidationError::UnresolvedScope {
                    level: Level::Words,
                    missing: "line",
                })?;
                Ok(Self::Words { line })
            }
            Level::Characters => {
                let line = state.line_index.ok_or(ValidationError::UnresolvedScope {
                    level: Level::Characters,
                    missing: "line",
                })?;
                let word = state
                    .resolved_word_index()
                    .ok_or(ValidationError::UnresolvedScope {
                        level: Level::Characters,
                        missing: "word",
                    })?;
                Ok(Self::Characters { line, word })
            }
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Lines => Level::Lines,
            Self::Words { .. } => Level::Words,
            Self::Characters { .. } => Level::Characters,
        }
    }

    pub fn target(self, document_id: impl Into<String>) -> MutationTarget {
        let (parent_index, line_index) = match self {
            Self::Lines => (None, None),
            Self::Words { line } => (Some(line), Some(line)),
            Self::Characters { line, word } => (Some(word), Some(line)),
        };

        MutationTarget {
            document_id: document_id.into(),
            level: self.level(),
            parent_index,
            line_index,
        }
    }
}

impl<S: DrillService> Navigator<S> {
    /// Inserts `value` at `position` in the displayed sequence, then refreshes it.
    pub async fn insert(&self, position: usize, value: &str) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.insert_inner(position, value).await;
        self.settle("insert", result)
    }

    /// Deletes the item at `position`; bounds are enforced by the service.
    pub async fn delete(&self, position: usize) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.delete_inner(position).await;
        self.settle("delete", result)
    }

    /// Moves the item at `from_index` to `to_index`. Equal indices are sent as-is.
    pub async fn reorder(&self, from_index: usize, to_index: usize) -> Result<NavOutcome, NavError> {
        self.dismiss_error();
        let result = self.reorder_inner(from_index, to_index).await;
        self.settle("reorder", result)
    }

    /// Where the next mutation would land, or why it cannot be addressed.
    pub fn mutation_target(&self) -> Result<MutationTarget, ValidationError> {
        let state = self.state();
        let scope = MutationScope::resolve(&state)?;
        let document_id = state
            .document_id
            .ok_or(ValidationError::NoActiveDocument)?;
        Ok(scope.target(document_id))
    }

    async fn insert_inner(&self, position: usize, value: &str) -> Result<NavOutcome, NavError> {
        if value.is_empty() {
            return Err(ValidationError::EmptyValue.into());
        }
        let request = InsertRequest {
            target: self.mutation_target()?,
            position,
            value: value.to_owned(),
        };

        debug!(level = request.target.level.as_u8(), position, "inserting item");
        {
            let _in_flight = self.track();
            self.service().insert(&request).await?;
        }
        info!(document_id = %request.target.document_id, position, "inserted item");
        self.refresh_inner().await
    }

    async fn delete_inner(&self, position: usize) -> Result<NavOutcome, NavError> {
        let request = DeleteRequest {
            target: self.mutation_target()?,
            position,
        };

        debug!(level = request.target.level.as_u8(), position, "deleting item");
        {
            let _in_flight = self.track();
            self.service().delete(&request).await?;
        }
        info!(document_id = %request.target.document_id, position, "deleted item");
        self.refresh_inner().await
    }

    async fn reorder_inner(
        &self,
        from_index: usize,
        to_index: usize,
    ) -> Result<NavOutcome, NavError> {
        let request = ReorderRequest {
            target: self.mutation_target()?,
            from_index,
            to_index,
        };

        debug!(
            level = request.target.level.as_u8(),
            from_index, to_index, "reordering item"
        );
        {
            let _in_flight = self.track();
            self.service().reorder(&request).await?;
        }
        info!(
            document_id = %request.target.document_id,
            from_index, to_index, "reordered item"
        );
        self.refresh_inner().await
    }
}
