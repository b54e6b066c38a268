//! The single-assignment slot holding a run's result.

use tokio::sync::watch;

use super::types::PipelineResult;

/// Creates a connected finisher and completion view.
pub(crate) fn completion_slot() -> (Finisher, Completion) {
    let (tx, rx) = watch::channel(None);
    (Finisher { tx: Some(tx) }, Completion { rx })
}

/// Write side of the completion slot.
///
/// [`finish`](Self::finish) consumes the finisher, so a result can be
/// published at most once. A finisher dropped without finishing publishes
/// [`PipelineResult::Cancelled`].
pub(crate) struct Finisher {
    tx: Option<watch::Sender<Option<PipelineResult>>>,
}

impl Finisher {
    pub(crate) fn finish(mut self, result: PipelineResult) -> PipelineResult {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(result.clone()));
        }
        result
    }
}

impl Drop for Finisher {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(PipelineResult::Cancelled));
        }
    }
}

/// Read side of the completion slot.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    rx: watch::Receiver<Option<PipelineResult>>,
}

impl Completion {
    pub(crate) fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub(crate) fn result(&self) -> Option<PipelineResult> {
        self.rx.borrow().clone()
    }

    pub(crate) async fn wait(&self) -> PipelineResult {
        let mut rx = self.rx.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        // The sender only goes away after publishing, so this fallback is not
        // reached in practice.
        published
            .or_else(|| self.rx.borrow().clone())
            .unwrap_or(PipelineResult::Cancelled)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<PipelineResult>> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;

    #[tokio::test]
    async fn test_finish_publishes_once() {
        let (finisher, completion) = completion_slot();
        let mut rx = completion.subscribe();
        assert!(!completion.is_finished());

        finisher.finish(PipelineResult::Success);

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().as_ref().is_some_and(|r| r.is_success()));
        // The sender is gone, so no second transition can ever be observed.
        assert!(rx.changed().await.is_err());
        assert!(completion.is_finished());
    }

    #[tokio::test]
    async fn test_wait_returns_published_result() {
        let (finisher, completion) = completion_slot();
        let waiter = {
            let completion = completion.clone();
            tokio::spawn(async move { completion.wait().await })
        };

        finisher.finish(PipelineResult::failed(PipelineError::NoEligibleTracks));

        let result = waiter.await.unwrap();
        assert!(matches!(
            result.error(),
            Some(PipelineError::NoEligibleTracks)
        ));
        assert_eq!(completion.result().map(|r| r.as_str()), Some("failed"));
    }

    #[tokio::test]
    async fn test_dropped_finisher_publishes_cancelled() {
        let (finisher, completion) = completion_slot();
        drop(finisher);
        assert!(completion.wait().await.is_cancelled());
    }
}
