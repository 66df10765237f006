//! Live-reload notification.
//!
//! The watch loop talks to an abstract [`Notifier`] rather than a concrete
//! websocket server, so the orchestration logic can run against a fake in
//! tests. The real implementation forwards signals to the broadcast thread
//! owning the client sockets.

/// A signal pushed to connected browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Reload the whole page.
    Reload,
    /// Only stylesheets changed; hot-swap them without a reload.
    RefreshStyles,
}

impl Signal {
    pub(crate) fn as_message(self) -> &'static str {
        match self {
            Signal::Reload => "reload",
            Signal::RefreshStyles => "refresh:css",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn reload(&self);
    fn refresh_styles(&self);
}

/// Notifier that swallows every signal. Used when live reload is toggled
/// off, and as the test stand-in.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn reload(&self) {}
    fn refresh_styles(&self) {}
}

/// Forwards signals into the websocket broadcast thread. Sending is
/// best-effort; a gone receiver means the session is shutting down.
#[cfg(feature = "live")]
pub(crate) struct ChannelNotifier {
    tx: std::sync::mpsc::Sender<Signal>,
}

#[cfg(feature = "live")]
impl ChannelNotifier {
    pub(crate) fn new(tx: std::sync::mpsc::Sender<Signal>) -> Self {
        Self { tx }
    }
}

#[cfg(feature = "live")]
impl Notifier for ChannelNotifier {
    fn reload(&self) {
        let _ = self.tx.send(Signal::Reload);
    }

    fn refresh_styles(&self) {
        let _ = self.tx.send(Signal::RefreshStyles);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signal_messages() {
        assert_eq!(Signal::Reload.as_message(), "reload");
        assert_eq!(Signal::RefreshStyles.as_message(), "refresh:css");
    }
}
