use crate::{
    error::Error,
    media::{MediaEvent, MediaSource},
};
use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};
use tracing::trace;

#[derive(Debug, PartialEq)]
pub(super) enum Waited<T> {
    Ready(T),
    TimedOut,
}

/// Wait at most `bound` for an event accepted by `select`.
///
/// A decode error ends the wait early. Events `select` rejects are dropped.
pub(super) async fn wait_for<S, T, F>(
    source: &mut S,
    bound: Duration,
    mut select: F,
) -> Result<Waited<T>, Error>
where
    S: MediaSource + ?Sized,
    F: FnMut(&MediaEvent) -> Option<T> + Send,
    T: Send,
{
    let watch = async {
        loop {
            let event = source.next_event().await;
            if let MediaEvent::DecodeError(message) = event {
                return Err(Error::Decode(message));
            }
            match select(&event) {
                Some(value) => return Ok(value),
                None => trace!(?event, "ignoring media event"),
            }
        }
    };
    match tokio::time::timeout(bound, watch).await {
        Ok(result) => result.map(Waited::Ready),
        Err(_) => Ok(Waited::TimedOut),
    }
}

/// Pauses the wrapped source when dropped, including when the owning future
/// is abandoned mid-wait.
pub(super) struct PauseOnDrop<'a, S: MediaSource + ?Sized>(&'a mut S);

impl<'a, S: MediaSource + ?Sized> PauseOnDrop<'a, S> {
    pub(super) fn new(source: &'a mut S) -> Self {
        Self(source)
    }
}

impl<S: MediaSource + ?Sized> Deref for PauseOnDrop<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.0
    }
}

impl<S: MediaSource + ?Sized> DerefMut for PauseOnDrop<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.0
    }
}

impl<S: MediaSource + ?Sized> Drop for PauseOnDrop<'_, S> {
    fn drop(&mut self) {
        self.0.pause();
    }
}
