//! Undo/redo transaction manager.
//!
//! Every committed request is pushed to an undo stack; undo pops it and runs
//! `on_undo` on the same instance, redo runs `on_redo` on it again.
//!
//! Interactive gestures open a **session**: requests committed while it is
//! open are applied live and collected, and closing the outermost session
//! pushes them as one undo step. Field-level requests can additionally be
//! merged into the previous step (`merge_previous`).

use crate::registry::{RequestArgs, RequestRegistry};
use crate::request::Request;
use fp_core::{Document, LogGroupType, TransactionConfig, TxnError, TxnResult};

/// Per-commit options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Fold the request into the newest undo step when both sides are
    /// field-level transactions.
    pub merge_previous: bool,
    /// Record the request for undo. Untracked requests are applied and dropped.
    pub undoable: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            merge_previous: false,
            undoable: true,
        }
    }
}

impl CommitOptions {
    pub fn merged() -> Self {
        Self {
            merge_previous: true,
            ..Self::default()
        }
    }

    pub fn untracked() -> Self {
        Self {
            undoable: false,
            ..Self::default()
        }
    }
}

/// Where a committed request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New undo step.
    Pushed,
    /// Folded into the previous step (or the previous pending request).
    Merged,
    /// Collected by the open session.
    Pending,
    /// Applied without an undo step.
    Untracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Committed,
    Undone,
    Redone,
}

/// Notification sent to subscribers after the stacks change.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnSignal {
    pub kind: SignalKind,
    pub description: String,
    pub category: LogGroupType,
}

type Listener = Box<dyn FnMut(&TxnSignal)>;

/// One undo step.
#[derive(Debug)]
enum Entry {
    Single(Box<dyn Request>),
    /// A closed session. Undone in reverse order, redone in commit order.
    Group {
        requests: Vec<Box<dyn Request>>,
        description: String,
        category: LogGroupType,
    },
}

impl Entry {
    fn description(&self) -> &str {
        match self {
            Entry::Single(request) => request.description(),
            Entry::Group { description, .. } => description,
        }
    }

    fn category(&self) -> LogGroupType {
        match self {
            Entry::Single(request) => request.category(),
            Entry::Group { category, .. } => *category,
        }
    }

    /// On failure the requests already undone are redone again, so the
    /// group is either fully undone or left as it was.
    fn undo(&mut self, doc: &mut Document) -> TxnResult<()> {
        let requests = match self {
            Entry::Single(request) => return request.on_undo(doc),
            Entry::Group { requests, .. } => requests,
        };
        for i in (0..requests.len()).rev() {
            if let Err(err) = requests[i].on_undo(doc) {
                for request in &mut requests[i + 1..] {
                    if let Err(rollback) = request.on_redo(doc) {
                        log::warn!("rollback of {:?} failed: {rollback}", request.description());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn redo(&mut self, doc: &mut Document) -> TxnResult<()> {
        let requests = match self {
            Entry::Single(request) => return request.on_redo(doc),
            Entry::Group { requests, .. } => requests,
        };
        for i in 0..requests.len() {
            if let Err(err) = requests[i].on_redo(doc) {
                for request in requests[..i].iter_mut().rev() {
                    if let Err(rollback) = request.on_undo(doc) {
                        log::warn!("rollback of {:?} failed: {rollback}", request.description());
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Session {
    /// Nesting depth (≥ 1 while open).
    depth: usize,
    pending: Vec<Box<dyn Request>>,
}

/// Manages undo/redo stacks, sessions and request construction.
pub struct TransactionManager {
    undo_stack: Vec<Entry>,
    redo_stack: Vec<Entry>,
    session: Option<Session>,
    registry: RequestRegistry,
    config: TransactionConfig,
    listeners: Vec<Listener>,
}

impl TransactionManager {
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            undo_stack: Vec::with_capacity(config.max_depth.min(256)),
            redo_stack: Vec::new(),
            session: None,
            registry: RequestRegistry::new(),
            config,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut RequestRegistry {
        &mut self.registry
    }

    pub fn create_request(&self, args: RequestArgs) -> TxnResult<Box<dyn Request>> {
        self.registry.create(args)
    }

    /// Commit a request as its own undo step.
    pub fn commit(
        &mut self,
        doc: &mut Document,
        request: Box<dyn Request>,
    ) -> TxnResult<CommitOutcome> {
        self.commit_with(doc, request, CommitOptions::default())
    }

    /// Run `on_commit` once and record the request according to `options`.
    ///
    /// A request whose commit fails is dropped; nothing is recorded.
    pub fn commit_with(
        &mut self,
        doc: &mut Document,
        mut request: Box<dyn Request>,
        options: CommitOptions,
    ) -> TxnResult<CommitOutcome> {
        if let Err(err) = request.on_commit(doc) {
            log::debug!("commit {:?} failed: {err}", request.description());
            return Err(err);
        }

        if !options.undoable {
            log::debug!("commit {:?} (untracked)", request.description());
            return Ok(CommitOutcome::Untracked);
        }

        let merge = options.merge_previous && self.config.merge_field_requests;

        if let Some(session) = &mut self.session {
            if merge {
                if let Some(prev) = session.pending.last_mut() {
                    if try_merge(&mut **prev, &*request) {
                        log::trace!("merged {:?} into pending request", request.description());
                        return Ok(CommitOutcome::Merged);
                    }
                }
            }
            log::trace!("session collects {:?}", request.description());
            session.pending.push(request);
            return Ok(CommitOutcome::Pending);
        }

        if merge {
            if let Some(Entry::Single(prev)) = self.undo_stack.last_mut() {
                if try_merge(&mut **prev, &*request) {
                    log::debug!("merged {:?} into previous step", request.description());
                    self.redo_stack.clear();
                    self.emit(SignalKind::Committed, request.description(), request.category());
                    return Ok(CommitOutcome::Merged);
                }
            }
        }

        log::debug!("commit {:?}", request.description());
        self.push(Entry::Single(request));
        Ok(CommitOutcome::Pushed)
    }

    // ── Sessions ──

    /// Open a session, or nest inside the one already open.
    pub fn begin_session(&mut self) {
        let session = self.session.get_or_insert_with(Session::default);
        session.depth += 1;
        log::debug!("session opened (depth {})", session.depth);
    }

    /// Close one session level. When the outermost level closes, the
    /// collected requests become one undo step. Returns whether a step was
    /// pushed; an empty session pushes nothing.
    pub fn commit_session(&mut self) -> TxnResult<bool> {
        let session = self.session.as_mut().ok_or(TxnError::NoSession)?;
        session.depth -= 1;
        if session.depth > 0 {
            return Ok(false);
        }

        let Some(session) = self.session.take() else {
            return Err(TxnError::NoSession);
        };
        let mut pending = session.pending;
        let entry = match pending.len() {
            0 => {
                log::debug!("session closed with no requests");
                return Ok(false);
            }
            1 => match pending.pop() {
                Some(request) => Entry::Single(request),
                None => return Ok(false),
            },
            n => {
                let description = pending[0].description().to_string();
                let category = pending[0].category();
                log::debug!("session closed: {n} requests grouped as {description:?}");
                Entry::Group {
                    requests: pending,
                    description,
                    category,
                }
            }
        };
        self.push(entry);
        Ok(true)
    }

    /// Discard the open session, undoing its requests in reverse order.
    /// Closes all nesting levels.
    pub fn abort_session(&mut self, doc: &mut Document) -> TxnResult<()> {
        let session = self.session.take().ok_or(TxnError::NoSession)?;
        log::warn!("session aborted: reverting {} requests", session.pending.len());
        let mut first_err = None;
        for mut request in session.pending.into_iter().rev() {
            if let Err(err) = request.on_undo(doc) {
                log::warn!("revert of {:?} failed: {err}", request.description());
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_session_open(&self) -> bool {
        self.session.is_some()
    }

    // ── Undo / redo ──

    /// Undo the newest step. Returns its description, or `None` when there
    /// is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> TxnResult<Option<String>> {
        if self.session.is_some() {
            return Err(TxnError::SessionOpen);
        }
        let Some(mut entry) = self.undo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = entry.undo(doc) {
            log::warn!("undo {:?} failed: {err}", entry.description());
            self.undo_stack.push(entry);
            return Err(err);
        }
        let desc = entry.description().to_string();
        log::debug!("undo {desc:?}");
        self.emit(SignalKind::Undone, &desc, entry.category());
        self.redo_stack.push(entry);
        Ok(Some(desc))
    }

    /// Redo the newest undone step.
    pub fn redo(&mut self, doc: &mut Document) -> TxnResult<Option<String>> {
        if self.session.is_some() {
            return Err(TxnError::SessionOpen);
        }
        let Some(mut entry) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(err) = entry.redo(doc) {
            log::warn!("redo {:?} failed: {err}", entry.description());
            self.redo_stack.push(entry);
            return Err(err);
        }
        let desc = entry.description().to_string();
        log::debug!("redo {desc:?}");
        self.emit(SignalKind::Redone, &desc, entry.category());
        self.undo_stack.push(entry);
        Ok(Some(desc))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Descriptions of the undo steps, newest first.
    pub fn undo_descriptions(&self) -> impl Iterator<Item = &str> {
        self.undo_stack.iter().rev().map(Entry::description)
    }

    /// Drop both stacks. An open session is left alone.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn category_label(&self, category: LogGroupType) -> &str {
        self.config.categories.label(category)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&TxnSignal) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn push(&mut self, entry: Entry) {
        self.emit(SignalKind::Committed, entry.description(), entry.category());
        self.undo_stack.push(entry);
        while self.undo_stack.len() > self.config.max_depth {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    fn emit(&mut self, kind: SignalKind, description: &str, category: LogGroupType) {
        if self.listeners.is_empty() {
            return;
        }
        let signal = TxnSignal {
            kind,
            description: description.to_string(),
            category,
        };
        for listener in &mut self.listeners {
            listener(&signal);
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(TransactionConfig::default())
    }
}

/// Both sides must be field-level transactions; otherwise the request
/// becomes its own step.
fn try_merge(prev: &mut dyn Request, next: &dyn Request) -> bool {
    if !(prev.can_transact_field() && next.can_transact_field()) {
        log::warn!(
            "merge of {:?} into {:?} rejected: not a field transaction",
            next.description(),
            prev.description()
        );
        return false;
    }
    prev.compose(next)
}
