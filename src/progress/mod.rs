//! Stage/percentage progress reporting for long audits.
//!
//! The engine produces updates over a bounded channel; callers that want
//! streaming stages consume the receiver. The tracker also retains the
//! latest update so graceful-timeout handling can ask how far the audit
//! got and whether a partial review is usable.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::judge::Review;

/// Default bound for the progress channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// A boxed stream of progress updates.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressUpdate> + Send>>;

/// Adapt a receiver into a stream for consumers that want one.
pub fn into_stream(receiver: mpsc::Receiver<ProgressUpdate>) -> ProgressStream {
    Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|update| (update, receiver))
    }))
}

/// Pipeline stage of one audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Initializing,
    TemplateRendering,
    ContextBuilding,
    WorkflowExecution,
    QualityAssessment,
    FeedbackGeneration,
    ResponseFormatting,
    Completed,
    TimedOut,
    Failed,
}

impl AuditStage {
    /// Nominal completion percentage at this stage.
    pub fn completion_percentage(&self) -> u8 {
        match self {
            Self::Initializing => 5,
            Self::TemplateRendering => 15,
            Self::ContextBuilding => 30,
            Self::WorkflowExecution => 55,
            Self::QualityAssessment => 75,
            Self::FeedbackGeneration => 90,
            Self::ResponseFormatting => 95,
            Self::Completed => 100,
            Self::TimedOut | Self::Failed => 100,
        }
    }

    /// Whether results captured at this stage are usable as partials.
    pub fn partials_usable(&self) -> bool {
        matches!(
            self,
            Self::FeedbackGeneration | Self::ResponseFormatting | Self::Completed
        )
    }
}

impl std::fmt::Display for AuditStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::TemplateRendering => "template_rendering",
            Self::ContextBuilding => "context_building",
            Self::WorkflowExecution => "workflow_execution",
            Self::QualityAssessment => "quality_assessment",
            Self::FeedbackGeneration => "feedback_generation",
            Self::ResponseFormatting => "response_formatting",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One progress update emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: AuditStage,
    pub completion_percentage: u8,
    /// Partial review captured so far, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Review>,
}

/// Producer half of the progress channel.
///
/// Sends are non-blocking: when the consumer lags, intermediate updates
/// are dropped rather than stalling the audit.
pub struct ProgressTracker {
    sender: mpsc::Sender<ProgressUpdate>,
    latest: Arc<RwLock<ProgressUpdate>>,
}

impl ProgressTracker {
    /// Create a tracker and its consumer handle.
    pub fn channel() -> (Self, mpsc::Receiver<ProgressUpdate>) {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let initial = ProgressUpdate {
            stage: AuditStage::Initializing,
            completion_percentage: 0,
            partial: None,
        };
        (
            Self {
                sender,
                latest: Arc::new(RwLock::new(initial)),
            },
            receiver,
        )
    }

    /// Record a stage transition.
    pub async fn update(&self, stage: AuditStage) {
        self.update_with_partial(stage, None).await;
    }

    /// Record a stage transition carrying a partial review.
    pub async fn update_with_partial(&self, stage: AuditStage, partial: Option<Review>) {
        let update = ProgressUpdate {
            stage,
            completion_percentage: stage.completion_percentage(),
            partial,
        };
        debug!("Audit progress: {} ({}%)", stage, update.completion_percentage);
        *self.latest.write().await = update.clone();
        // Drop on a full channel; the latest snapshot is authoritative.
        let _ = self.sender.try_send(update);
    }

    /// Latest update, for timeout handling.
    pub async fn latest(&self) -> ProgressUpdate {
        self.latest.read().await.clone()
    }

    /// Partial review if the audit got far enough for it to be usable.
    pub async fn usable_partial(&self) -> Option<Review> {
        let latest = self.latest.read().await;
        if latest.stage.partials_usable() {
            latest.partial.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::ReviewVerdict;

    #[tokio::test]
    async fn test_stage_updates_flow_through_channel() {
        let (tracker, mut receiver) = ProgressTracker::channel();

        tracker.update(AuditStage::TemplateRendering).await;
        tracker.update(AuditStage::WorkflowExecution).await;

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.stage, AuditStage::TemplateRendering);
        assert_eq!(first.completion_percentage, 15);

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.stage, AuditStage::WorkflowExecution);
    }

    #[tokio::test]
    async fn test_stream_adapter_yields_updates() {
        use futures::StreamExt;

        let (tracker, receiver) = ProgressTracker::channel();
        tracker.update(AuditStage::Initializing).await;
        drop(tracker);

        let updates: Vec<ProgressUpdate> = into_stream(receiver).collect().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].stage, AuditStage::Initializing);
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let (tracker, _receiver) = ProgressTracker::with_capacity(1);
        for _ in 0..10 {
            tracker.update(AuditStage::ContextBuilding).await;
        }
        assert_eq!(tracker.latest().await.stage, AuditStage::ContextBuilding);
    }

    #[tokio::test]
    async fn test_partial_only_usable_late_in_pipeline() {
        let (tracker, _receiver) = ProgressTracker::channel();
        let partial = Review::new(70, ReviewVerdict::Revise, "partial");

        tracker
            .update_with_partial(AuditStage::WorkflowExecution, Some(partial.clone()))
            .await;
        assert!(tracker.usable_partial().await.is_none());

        tracker
            .update_with_partial(AuditStage::FeedbackGeneration, Some(partial))
            .await;
        assert!(tracker.usable_partial().await.is_some());
    }
}
