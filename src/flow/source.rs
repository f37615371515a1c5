//! Push-based item sources.
//!
//! A source only pushes as many items as have been requested through its
//! [`Subscription`]. Items and terminal signals arrive on the receiver
//! returned by [`Source::subscribe`].

use tokio::sync::mpsc;

/// Upstream failure delivered as a terminal signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream source failed: {0}")]
pub struct SourceError(pub String);

/// Signals pushed by a source.
#[derive(Debug)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(SourceError),
}

/// Demand channel from a consumer back to its source.
pub trait Subscription: Send {
    /// Allow the source to push `n` more items.
    fn request(&mut self, n: u64);

    /// Stop the source. No signal is delivered afterwards.
    fn cancel(&mut self);
}

/// A push-based stream of `T`.
pub trait Source<T>: Send {
    type Subscription: Subscription + 'static;

    fn subscribe(self) -> (Self::Subscription, mpsc::UnboundedReceiver<Signal<T>>);
}

#[derive(Debug)]
enum Command {
    Request(u64),
    Cancel,
}

/// Subscription to an [`IterSource`].
#[derive(Debug)]
pub struct IterSubscription {
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription for IterSubscription {
    fn request(&mut self, n: u64) {
        // A closed channel means the source already terminated.
        let _ = self.commands.send(Command::Request(n));
    }

    fn cancel(&mut self) {
        let _ = self.commands.send(Command::Cancel);
    }
}

/// Source backed by an iterator of results.
///
/// An `Err` item terminates the stream with [`Signal::Error`]. Completion is
/// signalled as soon as the last item has been pushed.
#[derive(Debug)]
pub struct IterSource<I> {
    items: I,
}

impl<I> IterSource<I> {
    pub fn new(items: I) -> Self {
        Self { items }
    }
}

impl<T, I> IterSource<std::iter::Map<I, fn(T) -> Result<T, SourceError>>>
where
    I: Iterator<Item = T>,
{
    /// Source over infallible items.
    pub fn from_items<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        let ok: fn(T) -> Result<T, SourceError> = Ok;
        Self::new(items.into_iter().map(ok))
    }
}

impl<T, I> Source<T> for IterSource<I>
where
    T: Send + 'static,
    I: Iterator<Item = Result<T, SourceError>> + Send + 'static,
{
    type Subscription = IterSubscription;

    fn subscribe(self) -> (IterSubscription, mpsc::UnboundedReceiver<Signal<T>>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let mut items = self.items.peekable();

        tokio::spawn(async move {
            if items.peek().is_none() {
                let _ = signal_tx.send(Signal::Complete);
                return;
            }

            while let Some(command) = command_rx.recv().await {
                let n = match command {
                    Command::Request(n) => n,
                    Command::Cancel => {
                        tracing::trace!("Source cancelled");
                        return;
                    }
                };

                for _ in 0..n {
                    match items.next() {
                        Some(Ok(item)) => {
                            if signal_tx.send(Signal::Next(item)).is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            let _ = signal_tx.send(Signal::Error(e));
                            return;
                        }
                        None => break,
                    }
                }

                if items.peek().is_none() {
                    let _ = signal_tx.send(Signal::Complete);
                    return;
                }
            }
        });

        (
            IterSubscription {
                commands: command_tx,
            },
            signal_rx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushes_only_requested_items() {
        let (mut sub, mut rx) = IterSource::from_items(1..=5).subscribe();

        sub.request(2);
        assert!(matches!(rx.recv().await, Some(Signal::Next(1))));
        assert!(matches!(rx.recv().await, Some(Signal::Next(2))));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        sub.request(3);
        for expected in 3..=5 {
            assert!(matches!(rx.recv().await, Some(Signal::Next(v)) if v == expected));
        }
        assert!(matches!(rx.recv().await, Some(Signal::Complete)));
    }

    #[tokio::test]
    async fn empty_source_completes_without_demand() {
        let (_sub, mut rx) = IterSource::from_items(Vec::<u32>::new()).subscribe();
        assert!(matches!(rx.recv().await, Some(Signal::Complete)));
    }

    #[tokio::test]
    async fn error_item_terminates() {
        let items = vec![Ok(1), Err(SourceError("boom".into())), Ok(3)];
        let (mut sub, mut rx) = IterSource::new(items.into_iter()).subscribe();

        sub.request(3);
        assert!(matches!(rx.recv().await, Some(Signal::Next(1))));
        assert!(matches!(rx.recv().await, Some(Signal::Error(SourceError(m))) if m == "boom"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_the_source() {
        let (mut sub, mut rx) = IterSource::from_items(1..=5).subscribe();
        sub.cancel();
        sub.request(5);
        assert!(rx.recv().await.is_none());
    }
}
