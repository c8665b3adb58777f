//! Error model shared by the entity layer and the transaction core.

use crate::id::EntityId;
use crate::model::{Field, FieldValue};
use thiserror::Error;

/// Result type used across the transaction core.
pub type TxnResult<T> = Result<T, TxnError>;

/// Transaction-level error.
///
/// Missing entities at commit time are *not* errors (requests skip them);
/// everything here is either an entity-level failure that propagates out of
/// `on_commit`/`on_undo`/`on_redo`, or a misuse of the managers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TxnError {
    /// An entity exists but is not the kind an operation needs.
    #[error("entity {id} is not a {expected}")]
    WrongKind { id: EntityId, expected: &'static str },

    /// The entity kind has no such field.
    #[error("entity {id} has no field `{field:?}`")]
    UnknownField { id: EntityId, field: Field },

    /// A field write carried a value of the wrong type.
    #[error("field `{field:?}` of {id} cannot hold {value:?}")]
    FieldType {
        id: EntityId,
        field: Field,
        value: FieldValue,
    },

    /// A molding was expected on a face but is not attached to it.
    #[error("molding {molding} is not attached to face {face}")]
    MoldingNotAttached { face: EntityId, molding: EntityId },

    /// A molding is already attached to the face.
    #[error("molding {molding} is already attached to face {face}")]
    MoldingAlreadyAttached { face: EntityId, molding: EntityId },

    /// An entity snapshot could not be encoded or decoded.
    #[error("snapshot of {id} failed: {reason}")]
    Snapshot { id: EntityId, reason: String },

    /// A request constructor received arguments for another request type.
    #[error("request `{expected}` cannot be built from `{got}` arguments")]
    ArgumentMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// Undo/redo was attempted while a session is still collecting requests.
    #[error("a transaction session is still open")]
    SessionOpen,

    /// A session operation was attempted without an open session.
    #[error("no transaction session is open")]
    NoSession,

    /// A command reported completion more than once.
    #[error("command `{0}` was already completed")]
    AlreadyCompleted(String),

    /// A document or scenario could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TxnError {
    pub fn wrong_kind(id: EntityId, expected: &'static str) -> Self {
        Self::WrongKind { id, expected }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
