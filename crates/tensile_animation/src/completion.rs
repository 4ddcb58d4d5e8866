//! Completion signals
//!
//! Starting an animation hands back a [`Completion`], a future that resolves
//! once the animation settles or is cancelled. It is fed by a
//! `tokio::sync::oneshot` channel filled in by the frameloop, so awaiting it
//! never blocks a tick. Hosts without an executor can poll it with
//! [`Completion::try_result`] or drive it with `pollster::block_on`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome of an animation
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationResult<T> {
    /// Value at the moment the animation ended
    pub value: T,
    /// The animation reached its goal
    pub finished: bool,
    /// The animation was stopped before reaching its goal
    pub cancelled: bool,
}

impl<T> AnimationResult<T> {
    pub fn finished(value: T) -> Self {
        Self {
            value,
            finished: true,
            cancelled: false,
        }
    }

    pub fn cancelled(value: T) -> Self {
        Self {
            value,
            finished: false,
            cancelled: true,
        }
    }
}

pub(crate) type CompletionSender<T> = oneshot::Sender<AnimationResult<T>>;

enum State<T> {
    Waiting {
        rx: oneshot::Receiver<AnimationResult<T>>,
        fallback: T,
    },
    Done(AnimationResult<T>),
}

/// Future resolving to an [`AnimationResult`]
///
/// If the animation is dropped before it resolves, the completion reports
/// a cancellation carrying the value known when the animation started.
pub struct Completion<T> {
    state: State<T>,
}

impl<T: Clone> Completion<T> {
    /// An already-resolved completion
    pub fn ready(result: AnimationResult<T>) -> Self {
        Self {
            state: State::Done(result),
        }
    }

    pub(crate) fn channel(fallback: T) -> (CompletionSender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                state: State::Waiting { rx, fallback },
            },
        )
    }

    /// Non-blocking check; `None` while the animation is still running
    pub fn try_result(&mut self) -> Option<AnimationResult<T>> {
        let resolved = match &mut self.state {
            State::Done(result) => return Some(result.clone()),
            State::Waiting { rx, fallback } => match rx.try_recv() {
                Ok(result) => result,
                Err(oneshot::error::TryRecvError::Empty) => return None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    AnimationResult::cancelled(fallback.clone())
                }
            },
        };
        self.state = State::Done(resolved.clone());
        Some(resolved)
    }

    pub fn is_resolved(&mut self) -> bool {
        self.try_result().is_some()
    }
}

impl<T: Clone + Unpin> Future for Completion<T> {
    type Output = AnimationResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let resolved = match &mut this.state {
            State::Done(result) => return Poll::Ready(result.clone()),
            State::Waiting { rx, fallback } => match Pin::new(rx).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(result)) => result,
                Poll::Ready(Err(_)) => AnimationResult::cancelled(fallback.clone()),
            },
        };
        this.state = State::Done(resolved.clone());
        Poll::Ready(resolved)
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Waiting { .. } => "waiting",
            State::Done(_) => "done",
        };
        f.debug_struct("Completion").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_completion_resolves_immediately() {
        let mut completion = Completion::ready(AnimationResult::finished(1.0f32));
        assert_eq!(
            completion.try_result(),
            Some(AnimationResult::finished(1.0))
        );
        assert_eq!(
            pollster::block_on(completion),
            AnimationResult::finished(1.0)
        );
    }

    #[test]
    fn test_channel_delivers_result() {
        let (tx, mut completion) = Completion::channel(0.0f32);
        assert!(!completion.is_resolved());

        tx.send(AnimationResult::finished(5.0)).ok();
        let result = pollster::block_on(completion);
        assert!(result.finished);
        assert_eq!(result.value, 5.0);
    }

    #[test]
    fn test_dropped_sender_reports_cancelled() {
        let (tx, mut completion) = Completion::channel(3.0f32);
        drop(tx);
        let result = completion.try_result().unwrap();
        assert!(result.cancelled);
        assert!(!result.finished);
        assert_eq!(result.value, 3.0);
        // Cached after the first read
        assert_eq!(completion.try_result(), Some(result));
    }
}
