pub mod error;
pub mod oplog;
pub mod pattern;
pub mod types;

pub use error::{OrchestratorError, Result};
pub use oplog::{OPERATION_LOG_CAPACITY, OPERATION_LOG_TRIM_TO, OperationLog};
pub use types::{CacheOperation, OperationType};
