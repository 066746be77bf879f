/// Notifications raised to observing views. A view must re-read counts and
/// cells after every `ModelReset` instead of caching them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An action ran; carries a human-readable description.
    Executed(String),
    /// A connection was established to the given URL.
    Connected(String),
    Disconnected,
    /// Whether another fetch batch may return rows.
    FetchAvailable(bool),
    /// The entire row/column extent may have changed.
    ModelReset,
}

type Listener = Box<dyn FnMut(&Event) + Send>;

/// Synchronous listener list shared by the session and the table model.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Event) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: &Event) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{Event, Notifier};

    #[test]
    fn emit_reaches_every_listener_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            notifier.subscribe(move |event| {
                seen.lock().expect("listener log poisoned").push((tag, event.clone()));
            });
        }

        notifier.emit(&Event::Disconnected);
        notifier.emit(&Event::Connected(":memory:".to_string()));

        let seen = seen.lock().expect("listener log poisoned");
        assert_eq!(
            *seen,
            vec![
                ("first", Event::Disconnected),
                ("second", Event::Disconnected),
                ("first", Event::Connected(":memory:".to_string())),
                ("second", Event::Connected(":memory:".to_string())),
            ]
        );
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let mut notifier = Notifier::new();
        notifier.emit(&Event::FetchAvailable(false));
    }
}
