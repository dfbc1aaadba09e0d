//! Continuation and confirmation policy
//!
//! Depth and turn limits are policy points, not hard stops. The decision is
//! injected so headless deployments can supply an always-continue or
//! programmatic answer instead of a blocking console prompt.

use async_trait::async_trait;

/// Decides whether a bounded loop may continue past its limit
#[async_trait]
pub trait ContinuationPolicy: Send + Sync {
    async fn ask(&self, question: &str) -> bool;
}

/// Default policy for non-interactive deployments
pub struct AlwaysContinue;

#[async_trait]
impl ContinuationPolicy for AlwaysContinue {
    async fn ask(&self, _question: &str) -> bool {
        true
    }
}

/// Policy that stops at every limit, used by test configurations
pub struct NeverContinue;

#[async_trait]
impl ContinuationPolicy for NeverContinue {
    async fn ask(&self, _question: &str) -> bool {
        false
    }
}
