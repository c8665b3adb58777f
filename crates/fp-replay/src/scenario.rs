//! Scenario files: a configuration, a starting document and a list of steps.

use fp_core::{Document, Entity, TransactionConfig, TxnError};
use fp_editor::{
    CommandEvent, CommandManager, CommandSpec, CommandState, CompletionKind, TransactionManager,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Txn(#[from] TxnError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: TransactionConfig,
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Execute(CommandSpec),
    Event(CommandEvent),
    Cancel,
    Undo,
    Redo,
}

/// Result of one step. Failing steps are reported and replay continues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub steps: Vec<StepReport>,
    pub completions: Vec<String>,
    pub undo: Vec<&'a str>,
    pub redo_depth: usize,
    pub entities: Vec<&'a Entity>,
}

/// Everything a replay needs, kept together so the report can borrow it.
pub struct Replay {
    pub doc: Document,
    pub trans: TransactionManager,
    pub commands: CommandManager,
    pub steps: Vec<StepReport>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        let scenario: Self = serde_json::from_str(text)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    pub fn run(self) -> Replay {
        let mut replay = Replay {
            doc: Document::from_entities(self.entities),
            trans: TransactionManager::new(self.config),
            commands: CommandManager::new(),
            steps: Vec::with_capacity(self.steps.len()),
        };
        for (index, step) in self.steps.iter().enumerate() {
            let report = match replay.apply(step) {
                Ok(outcome) => StepReport {
                    index,
                    outcome,
                    error: None,
                },
                Err(err) => {
                    log::warn!("step {index} failed: {err}");
                    StepReport {
                        index,
                        outcome: "failed".into(),
                        error: Some(err.to_string()),
                    }
                }
            };
            replay.steps.push(report);
        }
        replay
    }
}

impl Replay {
    fn apply(&mut self, step: &Step) -> Result<String, TxnError> {
        log::debug!("step {step:?}");
        let Self {
            doc,
            trans,
            commands,
            ..
        } = self;
        let outcome = match step {
            Step::Execute(spec) => state_name(commands.execute(spec.build(), doc, trans)?),
            Step::Event(event) => state_name(commands.receive(event, doc, trans)?),
            Step::Cancel => state_name(commands.cancel(doc, trans)?),
            Step::Undo => match trans.undo(doc)? {
                Some(desc) => format!("undone: {desc}"),
                None => "nothing to undo".into(),
            },
            Step::Redo => match trans.redo(doc)? {
                Some(desc) => format!("redone: {desc}"),
                None => "nothing to redo".into(),
            },
        };
        Ok(outcome)
    }

    pub fn report(&self) -> Report<'_> {
        let completions = self
            .commands
            .completions()
            .iter()
            .map(|c| {
                let kind = match c.kind {
                    CompletionKind::Completed => "completed",
                    CompletionKind::Forced => "forced",
                    CompletionKind::Cancelled => "cancelled",
                };
                format!(
                    "{} [{}] {kind}",
                    c.command_type.as_str(),
                    self.trans.category_label(c.category)
                )
            })
            .collect();
        Report {
            steps: self.steps.clone(),
            completions,
            undo: self.trans.undo_descriptions().collect(),
            redo_depth: self.trans.redo_depth(),
            entities: self.doc.iter().collect(),
        }
    }
}

fn state_name(state: CommandState) -> String {
    match state {
        CommandState::Idle => "idle",
        CommandState::Executing => "executing",
        CommandState::Completed => "completed",
        CommandState::Cancelled => "cancelled",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_core::{EntityId, Field, FieldValue};
    use pretty_assertions::assert_eq;

    const KITCHEN: &str = include_str!("../tests/fixtures/kitchen.json");

    #[test]
    fn kitchen_scenario_replays() {
        let replay = Scenario::from_json(KITCHEN).unwrap().run();
        let outcomes: Vec<&str> = replay.steps.iter().map(|s| s.outcome.as_str()).collect();
        assert_eq!(
            outcomes,
            vec![
                "completed",
                "executing",
                "executing",
                "executing",
                "completed",
                "undone: Move content",
                "failed",
                "redone: Move content",
            ]
        );
        assert_eq!(
            replay.steps[6].error.as_deref(),
            Some("entity @stove is not a group")
        );

        let stove = replay.doc.get(EntityId::intern("stove")).unwrap();
        assert_eq!(stove.field(Field::X), Some(FieldValue::Number(3.0)));

        let report = replay.report();
        assert_eq!(report.undo, vec!["Move content", "Enable light slot"]);
        assert_eq!(
            report.completions,
            vec![
                "toggle_light_slot [Content] completed",
                "move_content [Content] completed",
                "flip_group [Content] forced",
            ]
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Scenario::from_json(r#"{ "config": { "max_depth": 0 }, "entities": [] }"#)
            .unwrap_err();
        assert!(matches!(err, ReplayError::Txn(TxnError::Config(_))));
    }

    #[test]
    fn steps_parse_from_json() {
        let steps: Vec<Step> = serde_json::from_str(
            r#"["undo", {"event": {"event": "drag_end"}}, {"execute": {"command": "flip_group", "group": null}}]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Undo,
                Step::Event(CommandEvent::DragEnd),
                Step::Execute(CommandSpec::FlipGroup { group: None }),
            ]
        );
    }
}
