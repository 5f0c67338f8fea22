//! Lifecycle observation for desktop shells.

use async_trait::async_trait;
use bridge_traits::{
    background::{LifecycleChangeStream, LifecycleObserver, LifecycleState},
    error::Result,
};
use tokio::sync::watch;
use tracing::debug;

/// Desktop lifecycle observer.
///
/// Desktop apps start in the foreground. The window layer reports minimize
/// and restore via [`set_state`](Self::set_state); subscribers see every
/// distinct transition after they subscribe.
pub struct DesktopLifecycleObserver {
    sender: watch::Sender<LifecycleState>,
}

impl DesktopLifecycleObserver {
    /// Create a new lifecycle observer.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(LifecycleState::Foreground);
        Self { sender }
    }

    /// Report a lifecycle transition from the window layer.
    pub fn set_state(&self, state: LifecycleState) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(?state, "Desktop lifecycle changed");
        }
    }
}

impl Default for DesktopLifecycleObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LifecycleObserver for DesktopLifecycleObserver {
    async fn get_state(&self) -> Result<LifecycleState> {
        Ok(*self.sender.borrow())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>> {
        let mut receiver = self.sender.subscribe();
        receiver.mark_unchanged();
        Ok(Box::new(DesktopLifecycleChangeStream { receiver }))
    }
}

struct DesktopLifecycleChangeStream {
    receiver: watch::Receiver<LifecycleState>,
}

#[async_trait]
impl LifecycleChangeStream for DesktopLifecycleChangeStream {
    async fn next(&mut self) -> Option<LifecycleState> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_observer_starts_foreground() {
        let observer = DesktopLifecycleObserver::new();
        assert_eq!(
            observer.get_state().await.unwrap(),
            LifecycleState::Foreground
        );
    }

    #[tokio::test]
    async fn test_lifecycle_stream_reports_transitions() {
        let observer = DesktopLifecycleObserver::new();
        let mut stream = observer.subscribe_changes().await.unwrap();

        observer.set_state(LifecycleState::Background);
        assert_eq!(stream.next().await, Some(LifecycleState::Background));

        observer.set_state(LifecycleState::Foreground);
        assert_eq!(stream.next().await, Some(LifecycleState::Foreground));
        assert_eq!(
            observer.get_state().await.unwrap(),
            LifecycleState::Foreground
        );
    }
}
