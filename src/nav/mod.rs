//! Drill-down navigation over the document → line → word → character hierarchy.
//!
//! [`NavigationState`] is the single record describing where the user stands. It
//! only changes through the planners below, which compute the *next* state without
//! touching the current one; the [`engine::Navigator`] sends the request derived
//! from that next state and swaps it in once the response arrives and is still the
//! latest one issued.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::service::{DrillDownRequest, Node};
use crate::text::{self, trail_label};

pub mod crosslink;
pub mod engine;
pub mod mutation;

pub use engine::{NavError, NavOutcome, Navigator, NavigatorSnapshot, ValidationError};
pub use mutation::MutationScope;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    /// No document selected.
    #[default]
    List,
    Lines,
    Words,
    Characters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid level {0}; expected 0..=3")]
pub struct InvalidLevel(pub u8);

impl Level {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::List => 0,
            Self::Lines => 1,
            Self::Words => 2,
            Self::Characters => 3,
        }
    }

    /// The level one drill below this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::List => Some(Self::Lines),
            Self::Lines => Some(Self::Words),
            Self::Words => Some(Self::Characters),
            Self::Characters => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::List => "documents",
            Self::Lines => "lines",
            Self::Words => "words",
            Self::Characters => "characters",
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for Level {
    type Error = InvalidLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::List),
            1 => Ok(Self::Lines),
            2 => Ok(Self::Words),
            3 => Ok(Self::Characters),
            other => Err(InvalidLevel(other)),
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.as_u8(), self.label())
    }
}

/// One visited position in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub level: Level,
    pub label: String,
    /// Full text of the node shown at this step; the parent text when jumping back here.
    pub text: String,
    /// Position of the node drilled into at this step. `None` for the document entry.
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    pub document_id: Option<String>,
    pub level: Level,
    pub parent_text: String,
    pub parent_index: Option<usize>,
    pub line_index: Option<usize>,
    pub trail: Vec<TrailEntry>,
}

impl NavigationState {
    /// Fresh level-1 state for a document whose full text is `document_text`.
    pub fn selected(document_id: impl Into<String>, document_text: impl Into<String>) -> Self {
        let document_id = document_id.into();
        let document_text = document_text.into();
        Self {
            trail: vec![TrailEntry {
                level: Level::Lines,
                label: document_id.clone(),
                text: document_text.clone(),
                index: None,
            }],
            document_id: Some(document_id),
            level: Level::Lines,
            parent_text: document_text,
            parent_index: None,
            line_index: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.document_id.is_some() && self.level != Level::List
    }

    /// The decomposition request that displays this state.
    pub fn request(&self) -> Option<DrillDownRequest> {
        let document_id = self.document_id.clone()?;
        if self.level == Level::List {
            return None;
        }

        Some(DrillDownRequest {
            document_id,
            level: self.level,
            parent_text: self.parent_text.clone(),
            parent_index: self.parent_index,
            delimiter: None,
        })
    }

    /// Next state after clicking `node`; `None` when the click is a no-op.
    pub fn plan_drill(&self, node: &Node) -> Option<Self> {
        if !self.is_active() || node.is_root || !node.can_drill_down {
            return None;
        }
        self.descend(&node.label, node.index)
    }

    /// Next state after jumping to line `line_index` from the level-1 view, exactly as
    /// if the line node carrying `line_text` had been clicked.
    pub fn plan_line_jump(&self, line_index: usize, line_text: &str) -> Option<Self> {
        if self.document_id.is_none() || self.level != Level::Lines {
            return None;
        }
        self.descend(line_text, line_index)
    }

    /// Next state after a breadcrumb jump to `trail_index`; `None` when no such entry exists.
    pub fn plan_navigate(&self, trail_index: usize) -> Option<Self> {
        self.document_id.as_ref()?;
        let target = self.trail.get(trail_index)?;

        let mut next = self.clone();
        next.level = target.level;
        next.parent_text = target.text.clone();
        next.parent_index = None;
        if target.level <= Level::Lines {
            next.line_index = None;
        }
        next.trail.truncate(trail_index + 1);
        Some(next)
    }

    /// Next state re-displaying the current level against the document's latest text.
    ///
    /// The parent text is recomputed from `paragraph` for the addressed line or word when
    /// that position still exists; `parent_index` is recomputed from the resolved scope.
    pub fn plan_refresh(&self, paragraph: &str) -> Option<Self> {
        if !self.is_active() {
            return None;
        }

        let mut next = self.clone();
        match self.level {
            Level::List => return None,
            Level::Lines => {
                next.parent_text = paragraph.to_owned();
                next.parent_index = None;
            }
            Level::Words => {
                next.parent_index = self.line_index;
                if let Some(line) = self.line_index.and_then(|line| text::line_at(paragraph, line))
                {
                    next.parent_text = line;
                }
            }
            Level::Characters => {
                let word_index = self.resolved_word_index();
                next.parent_index = word_index;
                if let (Some(line), Some(word)) = (self.line_index, word_index)
                    && let Some(word_text) = text::word_at(paragraph, line, word)
                {
                    next.parent_text = word_text;
                }
            }
        }
        Some(next)
    }

    /// Word addressed at character level, falling back to the trail after a back-jump
    /// cleared `parent_index`.
    pub fn resolved_word_index(&self) -> Option<usize> {
        if self.level != Level::Characters {
            return None;
        }
        self.parent_index.or_else(|| {
            self.trail
                .iter()
                .rev()
                .find(|entry| entry.level == Level::Characters)
                .and_then(|entry| entry.index)
        })
    }

    pub fn breadcrumbs(&self) -> Vec<&str> {
        self.trail.iter().map(|entry| entry.label.as_str()).collect()
    }

    fn descend(&self, label: &str, index: usize) -> Option<Self> {
        let level = self.level.next()?;

        let mut next = self.clone();
        next.level = level;
        next.parent_text = label.to_owned();
        next.parent_index = Some(index);
        if level == Level::Words {
            next.line_index = Some(index);
        }
        next.trail.push(TrailEntry {
            level,
            label: trail_label(label, index),
            text: label.to_owned(),
            index: Some(index),
        });
        Some(next)
    }
}

/// Monotonic tokens identifying navigation requests; only the latest may apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTokens {
    latest: u64,
}

impl RequestTokens {
    pub fn issue(&mut self) -> u64 {
        self.latest = self.latest.saturating_add(1);
        self.latest
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.latest
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }
}
