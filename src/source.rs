use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::sink::Sink;

/// Trait for sources that feed metrics into an injected sink
#[async_trait]
pub trait MetricSource<M: Send + 'static>: Send + Sync {
    /// Validate configuration before anything is started
    fn init(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Start producing metrics into the sink
    async fn start(&mut self, sink: Arc<dyn Sink<M>>) -> Result<(), SourceError>;

    /// Stop producing metrics
    async fn stop(&mut self);
}
