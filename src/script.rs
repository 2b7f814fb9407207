//! Replayable navigation sessions described in YAML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::nav::{NavOutcome, NavigationState, Navigator};
use crate::service::DrillService;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentScript {
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Intent>,
}

/// One user action, as a script step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Select(String),
    Drill(usize),
    /// Trail index to return to; negative goes back to the document list.
    Back(isize),
    Refresh,
    Home,
    Insert {
        position: usize,
        value: String,
    },
    Delete {
        position: usize,
    },
    Reorder {
        from: usize,
        to: usize,
    },
    Traverse {
        document: String,
        #[serde(default)]
        line: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<NavOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: NavigationState,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptReport {
    pub total_steps: usize,
    pub failed_steps: usize,
    pub steps: Vec<StepReport>,
}

pub fn parse_script(raw: &str) -> Result<IntentScript> {
    let script =
        serde_yaml::from_str::<IntentScript>(raw).context("failed to parse intent script")?;
    ensure!(
        !script.steps.is_empty(),
        "intent script must contain at least one step"
    );
    Ok(script)
}

pub fn load_script(path: &Path) -> Result<IntentScript> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read intent script `{}`", path.display()))?;
    parse_script(&raw).with_context(|| format!("invalid intent script `{}`", path.display()))
}

/// Replays every step in order. A failing step is recorded and the replay continues.
pub async fn run_script<S: DrillService>(
    navigator: &Navigator<S>,
    script: &IntentScript,
) -> ScriptReport {
    let mut steps = Vec::with_capacity(script.steps.len());

    for (index, intent) in script.steps.iter().enumerate() {
        let result = apply_intent(navigator, intent).await;
        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(error) if error.is_range() => {
                info!(
                    step = index,
                    ?intent,
                    error = %error,
                    "script step hit a range rejection"
                );
                (None, Some(error.to_string()))
            }
            Err(error) => {
                warn!(step = index, ?intent, error = %error, "script step failed");
                (None, Some(error.to_string()))
            }
        };

        steps.push(StepReport {
            index,
            intent: intent.clone(),
            outcome,
            error,
            state: navigator.state(),
            items: navigator
                .view()
                .items()
                .map(|node| node.label.clone())
                .collect(),
        });
    }

    let failed_steps = steps.iter().filter(|step| step.error.is_some()).count();
    info!(total_steps = steps.len(), failed_steps, "intent script finished");
    ScriptReport {
        total_steps: steps.len(),
        failed_steps,
        steps,
    }
}

async fn apply_intent<S: DrillService>(
    navigator: &Navigator<S>,
    intent: &Intent,
) -> Result<NavOutcome, crate::nav::NavError> {
    match intent {
        Intent::Select(document_id) => navigator.select_document(document_id).await,
        Intent::Drill(index) => navigator.drill_into_index(*index).await,
        Intent::Back(trail_index) => navigator.navigate_to(*trail_index).await,
        Intent::Refresh => navigator.refresh_current_level().await,
        Intent::Home => navigator.return_to_list().await,
        Intent::Insert { position, value } => navigator.insert(*position, value).await,
        Intent::Delete { position } => navigator.delete(*position).await,
        Intent::Reorder { from, to } => navigator.reorder(*from, *to).await,
        Intent::Traverse { document, line } => navigator.traverse(document, *line).await,
    }
}
