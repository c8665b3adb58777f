//! Commands: user-level operations that commit requests.
//!
//! A command runs once through [`CommandManager::execute`]. It either
//! completes during `on_execute`, or stays current and receives
//! [`CommandEvent`]s until it completes or is cancelled. Every command
//! reaches exactly one completion record, including commands whose
//! precondition fails and commands that return an error.

use crate::registry::RequestArgs;
use crate::request::{Request, StateRequest};
use crate::transaction::{CommitOptions, CommitOutcome, TransactionManager};
use fp_core::{Document, EntityId, Field, FieldValue, LogGroupType, TxnError, TxnResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    AutoFitOpeningToWall,
    ToggleMoldingAutofit,
    ToggleLightSlot,
    DeleteFaceMolding,
    FlipGroup,
    MoveContent,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::AutoFitOpeningToWall => "auto_fit_opening_to_wall",
            CommandType::ToggleMoldingAutofit => "toggle_molding_autofit",
            CommandType::ToggleLightSlot => "toggle_light_slot",
            CommandType::DeleteFaceMolding => "delete_face_molding",
            CommandType::FlipGroup => "flip_group",
            CommandType::MoveContent => "move_content",
        }
    }
}

/// Input forwarded to the current interactive command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommandEvent {
    DragMove { dx: f64, dy: f64 },
    DragEnd,
}

/// State of the manager after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// No command is current.
    Idle,
    /// The command is waiting for events.
    Executing,
    Completed,
    Cancelled,
}

// ─── Context ─────────────────────────────────────────────────────────────

/// Everything a command may touch while it runs.
pub struct CommandContext<'a> {
    pub doc: &'a mut Document,
    pub trans: &'a mut TransactionManager,
    completed: &'a mut bool,
    command_type: CommandType,
}

impl<'a> CommandContext<'a> {
    fn new(
        doc: &'a mut Document,
        trans: &'a mut TransactionManager,
        completed: &'a mut bool,
        command_type: CommandType,
    ) -> Self {
        Self {
            doc,
            trans,
            completed,
            command_type,
        }
    }

    /// Report completion. Must be called exactly once per command.
    pub fn complete(&mut self) -> TxnResult<()> {
        if *self.completed {
            return Err(TxnError::AlreadyCompleted(
                self.command_type.as_str().to_string(),
            ));
        }
        *self.completed = true;
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        *self.completed
    }

    pub fn create_request(&self, args: RequestArgs) -> TxnResult<Box<dyn Request>> {
        self.trans.create_request(args)
    }

    pub fn commit(&mut self, request: Box<dyn Request>) -> TxnResult<CommitOutcome> {
        self.trans.commit(self.doc, request)
    }

    pub fn commit_with(
        &mut self,
        request: Box<dyn Request>,
        options: CommitOptions,
    ) -> TxnResult<CommitOutcome> {
        self.trans.commit_with(self.doc, request, options)
    }
}

// ─── Command trait ───────────────────────────────────────────────────────

pub trait Command {
    fn command_type(&self) -> CommandType;

    fn description(&self) -> &str;

    fn category(&self) -> LogGroupType;

    /// Whether the command's requests are recorded for undo.
    fn can_undo_redo(&self) -> bool {
        true
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()>;

    /// Handle an event while current. Returns whether it was consumed.
    fn on_receive(
        &mut self,
        _event: &CommandEvent,
        _ctx: &mut CommandContext<'_>,
    ) -> TxnResult<bool> {
        Ok(false)
    }

    /// Release anything the command holds open. Called on cancellation and
    /// on forced completion.
    fn on_cancel(&mut self, _ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        Ok(())
    }

    fn on_cleanup(&mut self) {}

    fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            undoable: self.can_undo_redo(),
            ..CommitOptions::default()
        }
    }
}

// ─── Manager ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// The command called `complete()`.
    Completed,
    /// The command failed before completing; the manager completed it.
    Forced,
    Cancelled,
}

/// One terminated command.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub command_type: CommandType,
    pub description: String,
    pub category: LogGroupType,
    pub undoable: bool,
    pub kind: CompletionKind,
}

/// Runs commands and guarantees each one terminates exactly once.
#[derive(Default)]
pub struct CommandManager {
    current: Option<Box<dyn Command>>,
    completions: Vec<Completion>,
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a command. A command that is still current is cancelled first.
    pub fn execute(
        &mut self,
        mut command: Box<dyn Command>,
        doc: &mut Document,
        trans: &mut TransactionManager,
    ) -> TxnResult<CommandState> {
        if let Some(previous) = &self.current {
            log::warn!(
                "{} still running; cancelling before {}",
                previous.command_type().as_str(),
                command.command_type().as_str()
            );
            if let Err(err) = self.cancel(doc, trans) {
                log::warn!("cancel failed: {err}");
            }
        }

        log::debug!("execute {}", command.command_type().as_str());
        let mut completed = false;
        let result = {
            let mut ctx = CommandContext::new(doc, trans, &mut completed, command.command_type());
            command.on_execute(&mut ctx)
        };
        self.settle(command, completed, result, doc, trans)
    }

    /// Forward an event to the current command.
    pub fn receive(
        &mut self,
        event: &CommandEvent,
        doc: &mut Document,
        trans: &mut TransactionManager,
    ) -> TxnResult<CommandState> {
        let Some(mut command) = self.current.take() else {
            log::trace!("event {event:?} with no current command");
            return Ok(CommandState::Idle);
        };
        let mut completed = false;
        let result = {
            let mut ctx = CommandContext::new(doc, trans, &mut completed, command.command_type());
            command.on_receive(event, &mut ctx)
        };
        let result = result.map(|consumed| {
            if !consumed {
                log::trace!("{} ignored {event:?}", command.command_type().as_str());
            }
        });
        self.settle(command, completed, result, doc, trans)
    }

    /// Abandon the current command.
    pub fn cancel(
        &mut self,
        doc: &mut Document,
        trans: &mut TransactionManager,
    ) -> TxnResult<CommandState> {
        let Some(mut command) = self.current.take() else {
            return Ok(CommandState::Idle);
        };
        log::debug!("cancel {}", command.command_type().as_str());
        let result = release(command.as_mut(), doc, trans);
        self.finish(command, CompletionKind::Cancelled);
        result.map(|()| CommandState::Cancelled)
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_type(&self) -> Option<CommandType> {
        self.current.as_ref().map(|c| c.command_type())
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    fn settle(
        &mut self,
        mut command: Box<dyn Command>,
        completed: bool,
        result: TxnResult<()>,
        doc: &mut Document,
        trans: &mut TransactionManager,
    ) -> TxnResult<CommandState> {
        match result {
            Ok(()) if completed => {
                self.finish(command, CompletionKind::Completed);
                Ok(CommandState::Completed)
            }
            Ok(()) => {
                self.current = Some(command);
                Ok(CommandState::Executing)
            }
            Err(err) if completed => {
                self.finish(command, CompletionKind::Completed);
                Err(err)
            }
            Err(err) => {
                log::warn!(
                    "{} failed, forcing completion: {err}",
                    command.command_type().as_str()
                );
                if let Err(release_err) = release(command.as_mut(), doc, trans) {
                    log::warn!("release failed: {release_err}");
                }
                self.finish(command, CompletionKind::Forced);
                Err(err)
            }
        }
    }

    fn finish(&mut self, mut command: Box<dyn Command>, kind: CompletionKind) {
        command.on_cleanup();
        log::debug!("{} finished ({kind:?})", command.command_type().as_str());
        self.completions.push(Completion {
            command_type: command.command_type(),
            description: command.description().to_string(),
            category: command.category(),
            undoable: command.can_undo_redo(),
            kind,
        });
    }
}

fn release(
    command: &mut dyn Command,
    doc: &mut Document,
    trans: &mut TransactionManager,
) -> TxnResult<()> {
    let mut completed = true;
    let mut ctx = CommandContext::new(doc, trans, &mut completed, command.command_type());
    command.on_cancel(&mut ctx)
}

// ─── Concrete commands ───────────────────────────────────────────────────

/// Fit an opening's depth to its host wall. Not undoable.
#[derive(Debug, Clone)]
pub struct AutoFitOpeningToWallCommand {
    pub opening: Option<EntityId>,
    pub host: Option<EntityId>,
}

impl Command for AutoFitOpeningToWallCommand {
    fn command_type(&self) -> CommandType {
        CommandType::AutoFitOpeningToWall
    }

    fn description(&self) -> &str {
        "Auto-fit opening to wall"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::WallOperation
    }

    fn can_undo_redo(&self) -> bool {
        false
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        match (self.opening, self.host) {
            (Some(opening), Some(host)) if ctx.doc.contains(opening) && ctx.doc.contains(host) => {
                let request = ctx.create_request(RequestArgs::AutoFitOpening {
                    opening: Some(opening),
                    host: Some(host),
                })?;
                ctx.commit_with(request, self.commit_options())?;
            }
            _ => log::debug!("auto-fit skipped: opening or host missing"),
        }
        ctx.complete()
    }
}

/// Invert a molding's `auto_fit` flag.
#[derive(Debug, Clone)]
pub struct ToggleMoldingAutofitCommand {
    pub molding: Option<EntityId>,
}

impl Command for ToggleMoldingAutofitCommand {
    fn command_type(&self) -> CommandType {
        CommandType::ToggleMoldingAutofit
    }

    fn description(&self) -> &str {
        "Toggle molding auto-fit"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::FaceOperation
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        let current = self
            .molding
            .and_then(|id| ctx.doc.get(id))
            .and_then(|e| e.field(Field::AutoFit))
            .and_then(FieldValue::as_bool);
        if let Some(auto_fit) = current {
            let request = ctx.create_request(RequestArgs::ChangeMoldingAutofit {
                molding: self.molding,
                auto_fit: !auto_fit,
            })?;
            ctx.commit_with(request, self.commit_options())?;
        }
        ctx.complete()
    }
}

#[derive(Debug, Clone)]
pub struct ToggleLightSlotCommand {
    pub model: Option<EntityId>,
    pub checked: bool,
}

impl Command for ToggleLightSlotCommand {
    fn command_type(&self) -> CommandType {
        CommandType::ToggleLightSlot
    }

    fn description(&self) -> &str {
        "Toggle light slot"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::ContentOperation
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        if self.model.is_some_and(|id| ctx.doc.contains(id)) {
            let request = ctx.create_request(RequestArgs::LightSlotState {
                model: self.model,
                checked: self.checked,
            })?;
            ctx.commit_with(request, self.commit_options())?;
        }
        ctx.complete()
    }
}

#[derive(Debug, Clone)]
pub struct DeleteFaceMoldingCommand {
    pub face: Option<EntityId>,
    pub molding: Option<EntityId>,
}

impl Command for DeleteFaceMoldingCommand {
    fn command_type(&self) -> CommandType {
        CommandType::DeleteFaceMolding
    }

    fn description(&self) -> &str {
        "Delete face molding"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::FaceOperation
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        if let (Some(face), Some(molding)) = (self.face, self.molding) {
            if ctx.doc.contains(face) && ctx.doc.contains(molding) {
                let request = ctx.create_request(RequestArgs::DeleteFaceMolding {
                    face: Some(face),
                    molding: Some(molding),
                })?;
                ctx.commit_with(request, self.commit_options())?;
            }
        }
        ctx.complete()
    }
}

#[derive(Debug, Clone)]
pub struct FlipGroupCommand {
    pub group: Option<EntityId>,
}

impl Command for FlipGroupCommand {
    fn command_type(&self) -> CommandType {
        CommandType::FlipGroup
    }

    fn description(&self) -> &str {
        "Flip group"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::ContentOperation
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        if self.group.is_some_and(|id| ctx.doc.contains(id)) {
            let request = ctx.create_request(RequestArgs::GroupFlip { group: self.group })?;
            ctx.commit_with(request, self.commit_options())?;
        }
        ctx.complete()
    }
}

/// Drag a content around. Every `DragMove` commits a merged field request
/// inside one session; `DragEnd` closes it as a single undo step.
#[derive(Debug, Clone)]
pub struct MoveContentCommand {
    pub content: Option<EntityId>,
    session_open: bool,
}

impl MoveContentCommand {
    pub fn new(content: Option<EntityId>) -> Self {
        Self {
            content,
            session_open: false,
        }
    }

    fn position(&self, doc: &Document) -> Option<(EntityId, f64, f64)> {
        let id = self.content?;
        let entity = doc.get(id)?;
        let x = entity.field(Field::X)?.as_number()?;
        let y = entity.field(Field::Y)?.as_number()?;
        Some((id, x, y))
    }
}

impl Command for MoveContentCommand {
    fn command_type(&self) -> CommandType {
        CommandType::MoveContent
    }

    fn description(&self) -> &str {
        "Move content"
    }

    fn category(&self) -> LogGroupType {
        LogGroupType::ContentOperation
    }

    fn on_execute(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        if self.position(ctx.doc).is_none() {
            log::debug!("move skipped: no content to move");
            return ctx.complete();
        }
        ctx.trans.begin_session();
        self.session_open = true;
        Ok(())
    }

    fn on_receive(
        &mut self,
        event: &CommandEvent,
        ctx: &mut CommandContext<'_>,
    ) -> TxnResult<bool> {
        match *event {
            CommandEvent::DragMove { dx, dy } => {
                let Some((id, x, y)) = self.position(ctx.doc) else {
                    return Ok(false);
                };
                let request = StateRequest::field_mode(self.description(), self.category())
                    .transact(id, Field::X, FieldValue::Number(x + dx))
                    .transact(id, Field::Y, FieldValue::Number(y + dy));
                ctx.commit_with(
                    Box::new(request),
                    CommitOptions {
                        merge_previous: true,
                        ..self.commit_options()
                    },
                )?;
                Ok(true)
            }
            CommandEvent::DragEnd => {
                if self.session_open {
                    self.session_open = false;
                    ctx.trans.commit_session()?;
                }
                ctx.complete()?;
                Ok(true)
            }
        }
    }

    fn on_cancel(&mut self, ctx: &mut CommandContext<'_>) -> TxnResult<()> {
        if self.session_open {
            self.session_open = false;
            ctx.trans.abort_session(ctx.doc)?;
        }
        Ok(())
    }
}

// ─── Command descriptions as data ────────────────────────────────────────

/// Serializable description of a command, used by scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandSpec {
    AutoFitOpeningToWall {
        opening: Option<EntityId>,
        host: Option<EntityId>,
    },
    ToggleMoldingAutofit {
        molding: Option<EntityId>,
    },
    ToggleLightSlot {
        model: Option<EntityId>,
        checked: bool,
    },
    DeleteFaceMolding {
        face: Option<EntityId>,
        molding: Option<EntityId>,
    },
    FlipGroup {
        group: Option<EntityId>,
    },
    MoveContent {
        content: Option<EntityId>,
    },
}

impl CommandSpec {
    pub fn build(&self) -> Box<dyn Command> {
        match self.clone() {
            CommandSpec::AutoFitOpeningToWall { opening, host } => {
                Box::new(AutoFitOpeningToWallCommand { opening, host })
            }
            CommandSpec::ToggleMoldingAutofit { molding } => {
                Box::new(ToggleMoldingAutofitCommand { molding })
            }
            CommandSpec::ToggleLightSlot { model, checked } => {
                Box::new(ToggleLightSlotCommand { model, checked })
            }
            CommandSpec::DeleteFaceMolding { face, molding } => {
                Box::new(DeleteFaceMoldingCommand { face, molding })
            }
            CommandSpec::FlipGroup { group } => Box::new(FlipGroupCommand { group }),
            CommandSpec::MoveContent { content } => Box::new(MoveContentCommand::new(content)),
        }
    }
}
