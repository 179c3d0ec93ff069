use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::{EngineHandle, TelemetryEvent};
use crate::analysis::features::FeatureFrame;
use crate::analysis::ClassificationResult;

/// Lagged receivers skip what they missed instead of ending the stream
fn skip_lagged<T>(stream: BroadcastStream<T>, channel: &'static str) -> impl Stream<Item = T>
where
    T: Clone + Send + 'static,
{
    stream.filter_map(move |item| match item {
        Ok(value) => Some(value),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!("[EngineHandle] {} subscriber lagged, skipped {}", channel, missed);
            None
        }
    })
}

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Every feature frame, in hop order
    pub fn subscribe_frames(&self) -> broadcast::Receiver<FeatureFrame> {
        self.frame_tx.subscribe()
    }

    /// Every classification result
    pub fn subscribe_classifications(&self) -> broadcast::Receiver<ClassificationResult> {
        self.result_tx.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry_tx.subscribe()
    }

    pub fn frame_stream(&self) -> impl Stream<Item = FeatureFrame> {
        skip_lagged(BroadcastStream::new(self.frame_tx.subscribe()), "frame")
    }

    pub fn classification_stream(&self) -> impl Stream<Item = ClassificationResult> {
        skip_lagged(
            BroadcastStream::new(self.result_tx.subscribe()),
            "classification",
        )
    }

    pub fn telemetry_stream(&self) -> impl Stream<Item = TelemetryEvent> {
        skip_lagged(
            BroadcastStream::new(self.telemetry_tx.subscribe()),
            "telemetry",
        )
    }
}
