//! # Cross-platform OS signal handling.
//!
//! [`os_signals`] installs the listeners once and exposes every delivery as a
//! stream item; [`forward_signals`] turns that stream into termination requests.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]
//!
//! ## Rules
//! - The handler never touches lifecycle state: it sends
//!   [`Termination::External`] on the channel drained by the supervisory loop.
//! - Only the first signal requests termination; later ones are reported as
//!   `SignalRepeated` while the graceful shutdown is in progress.

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::state::Termination;
use crate::events::{Bus, Event, EventKind};

/// Names of delivered signals, one item per delivery.
pub(crate) type SignalStream = BoxStream<'static, &'static str>;

/// Installs SIGINT/SIGTERM/SIGQUIT listeners.
///
/// Returns `Err` if signal registration fails.
#[cfg(unix)]
pub(crate) fn os_signals() -> std::io::Result<SignalStream> {
    use tokio::signal::unix::{SignalKind, signal};

    let sigint = signal(SignalKind::interrupt())?;
    let sigterm = signal(SignalKind::terminate())?;
    let sigquit = signal(SignalKind::quit())?;

    let stream = futures::stream::unfold(
        (sigint, sigterm, sigquit),
        |(mut sigint, mut sigterm, mut sigquit)| async move {
            let name = tokio::select! {
                Some(()) = sigint.recv()  => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigquit.recv() => "SIGQUIT",
                else => return None,
            };
            Some((name, (sigint, sigterm, sigquit)))
        },
    );
    Ok(stream.boxed())
}

/// Installs the Ctrl-C listener.
#[cfg(not(unix))]
pub(crate) fn os_signals() -> std::io::Result<SignalStream> {
    let stream = futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ("Ctrl-C", ()))
    });
    Ok(stream.boxed())
}

/// Forwards delivered signals until `token` is cancelled or the stream ends.
pub(crate) async fn forward_signals(
    mut signals: SignalStream,
    bus: Bus,
    requests: mpsc::UnboundedSender<Termination>,
    token: CancellationToken,
) {
    let mut requested = false;
    loop {
        let name = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = signals.next() => match next {
                Some(name) => name,
                None => return,
            },
        };

        if requested {
            bus.publish(Event::new(EventKind::SignalRepeated).with_reason(name));
        } else {
            requested = true;
            bus.publish(Event::new(EventKind::SignalReceived).with_reason(name));
            let _ = requests.send(Termination::External);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_first_signal_requests_termination() {
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signals = futures::stream::iter(["SIGTERM", "SIGINT", "SIGTERM"]).boxed();

        forward_signals(signals, bus, tx, CancellationToken::new()).await;

        assert_eq!(rx.recv().await, Some(Termination::External));
        assert_eq!(rx.recv().await, None);

        let kinds: Vec<(EventKind, String)> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| (e.kind, e.reason.as_deref().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (EventKind::SignalReceived, "SIGTERM".to_string()),
                (EventKind::SignalRepeated, "SIGINT".to_string()),
                (EventKind::SignalRepeated, "SIGTERM".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_listener_exits() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        token.cancel();

        forward_signals(
            futures::stream::pending().boxed(),
            Bus::new(1),
            tx,
            token,
        )
        .await;
        assert_eq!(rx.recv().await, None);
    }
}
