use super::index::DomainIndex;
use crate::error::SourceError;

/// The "Control Plane" side of the engine: produces a fresh index on demand.
#[async_trait::async_trait]
pub trait IndexSource: Send + Sync + 'static {
    /// Fetches the configured list and builds a new index from it.
    async fn load(&self) -> Result<DomainIndex, SourceError>;

    /// Human readable origin, used in log lines.
    fn describe(&self) -> String;
}
