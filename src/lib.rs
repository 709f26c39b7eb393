//! IBP XYZ Segment Write-back Library
//!
//! This library writes XYZ segment classifications (X, Y or Z per product,
//! optionally per location and period) back into a planning area through
//! the platform's planning data write API.
//!
//! Supports three write strategies:
//! - Simple: single request with immediate commit
//! - Batched: sequential batches in one transaction, explicit commit
//! - Parallel: concurrent batches in a parallel-process transaction

pub mod config;
pub mod error;
pub mod record;
pub mod target;
pub mod payload;
pub mod transport;
pub mod session;
pub mod transaction;
pub mod partition;
pub mod dispatcher;
pub mod writer;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::{ConfigStatus, WriteConfig};
pub use error::{ErrorKind, Result, WriteError};
pub use record::{RawSegmentRow, Segment, SegmentRecord};
pub use target::WriteTarget;
pub use payload::TransactionPayload;
pub use transport::{HttpReply, PlanningSession, PlanningTransport, ReqwestTransport};
pub use session::{AuthorizedSession, SessionProvider};
pub use transaction::{TransactionManager, TransactionState, WriteStatus};
pub use dispatcher::{BatchOutcome, BatchStatus, ParallelDispatcher};
pub use writer::{SegmentWriter, TransactionResult, WriteMode, WriteOptions};
