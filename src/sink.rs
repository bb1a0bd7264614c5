use log::warn;
use tokio::sync::mpsc;

use crate::error::SourceError;

/// The metrics-accumulation destination.
///
/// Both methods take `&self` and must tolerate concurrent calls: the stdout
/// demultiplexer and the stderr router report into the same sink, as do
/// multiple adapter instances sharing one.
pub trait Sink<M>: Send + Sync + 'static {
    /// Accept one metric
    fn add_metric(&self, metric: M);

    /// Accept a recoverable error observed while producing metrics
    fn add_error(&self, error: SourceError);
}

/// A sink that forwards metrics into a tokio mpsc channel.
///
/// Errors are logged rather than forwarded. Metrics are dropped with a
/// warning if the channel is full or closed; the read loops must never block
/// on a slow consumer.
pub struct ChannelSink<M> {
    tx: mpsc::Sender<M>,
}

impl<M> ChannelSink<M> {
    /// Create a sink around an existing sender
    pub fn new(tx: mpsc::Sender<M>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<M>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

impl<M: Send + 'static> Sink<M> for ChannelSink<M> {
    fn add_metric(&self, metric: M) {
        if self.tx.try_send(metric).is_err() {
            warn!("metric channel full or closed; dropping metric");
        }
    }

    fn add_error(&self, error: SourceError) {
        warn!("source error: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_metrics() {
        let (sink, mut rx) = ChannelSink::channel(4);
        sink.add_metric(1u64);
        sink.add_metric(2u64);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::channel(1);
        sink.add_metric(1u64);
        sink.add_metric(2u64);

        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
    }
}
