pub mod commands;
pub mod registry;
pub mod request;
pub mod requests;
pub mod transaction;

pub use commands::{
    AutoFitOpeningToWallCommand, Command, CommandContext, CommandEvent, CommandManager,
    CommandSpec, CommandState, CommandType, Completion, CompletionKind, DeleteFaceMoldingCommand,
    FlipGroupCommand, MoveContentCommand, ToggleLightSlotCommand, ToggleMoldingAutofitCommand,
};
pub use registry::{RequestArgs, RequestRegistry, RequestType};
pub use request::{CaptureMode, FieldChange, FnRequest, Request, StateRequest};
pub use requests::*;
pub use transaction::{
    CommitOptions, CommitOutcome, SignalKind, TransactionManager, TxnSignal,
};
