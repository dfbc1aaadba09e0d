//! Optional turn persistence
//!
//! When configured, every turn appended to an agent's history is offered to
//! the persistence collaborator. Persistence failures are logged and skipped,
//! they never interrupt an active run.

use crate::core::{Message, Result};
use async_trait::async_trait;

/// External store for conversation turns
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Persist a single turn
    async fn persist(&self, turn: &Message) -> Result<()>;

    /// Release any held connections
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
