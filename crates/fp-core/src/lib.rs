pub mod category;
pub mod config;
pub mod error;
pub mod id;
pub mod model;

pub use category::{CategoryTable, LogGroupType};
pub use config::TransactionConfig;
pub use error::{TxnError, TxnResult};
pub use id::EntityId;
pub use model::*;
