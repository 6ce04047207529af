//! Composition of the session-level and per-call cancellation tokens.

use tokio_util::sync::CancellationToken;

/// Effective cancellation for one read: fires when either source fires.
///
/// Neither source is modified; cancelling the merged view is not possible,
/// so a read aborted by the caller's token leaves the session usable.
#[derive(Clone, Debug)]
pub struct MergedCancellation {
    session: CancellationToken,
    call: CancellationToken,
}

impl MergedCancellation {
    pub fn new(session: &CancellationToken, call: &CancellationToken) -> Self {
        Self {
            session: session.clone(),
            call: call.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled() || self.call.is_cancelled()
    }

    /// Resolves once either source has been cancelled.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.session.cancelled() => {}
            _ = self.call.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn fires_on_either_source() {
        for cancel_session in [true, false] {
            let session = CancellationToken::new();
            let call = CancellationToken::new();
            let merged = MergedCancellation::new(&session, &call);
            assert!(!merged.is_cancelled());

            if cancel_session {
                session.cancel();
            } else {
                call.cancel();
            }

            assert!(merged.is_cancelled());
            timeout(Duration::from_secs(1), merged.cancelled())
                .await
                .expect("merged token did not fire");
        }
    }

    #[tokio::test]
    async fn call_cancellation_leaves_session_untouched() {
        let session = CancellationToken::new();
        let call = CancellationToken::new();
        call.cancel();

        let merged = MergedCancellation::new(&session, &call);
        assert!(merged.is_cancelled());
        assert!(!session.is_cancelled());
    }
}
