use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

/// An event recorded by [`LogCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    /// Value of the `table` field, when present.
    pub table: Option<String>,
}

/// Records the events emitted while it is installed, so tests can assert on log lines.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the capture as the default subscriber of the current thread until the guard
    /// is dropped. Use it from current thread runtimes so that every task is observed.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.message)
            .collect()
    }

    /// Number of events whose message is exactly `message`.
    pub fn count(&self, message: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.message == message)
            .count()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.count(message) > 0
    }

    /// Messages logged with `table = table_name`.
    pub fn messages_for(&self, table_name: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.table.as_deref() == Some(table_name))
            .map(|event| event.message)
            .collect()
    }

    pub fn errors_for(&self, table_name: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| {
                event.level == Level::ERROR && event.table.as_deref() == Some(table_name)
            })
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedEvent {
                level: *event.metadata().level(),
                message: visitor.message.unwrap_or_default(),
                table: visitor.table,
            });
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    table: Option<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "table" => self.table = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            "table" => self.table = Some(format!("{value:?}")),
            _ => {}
        }
    }
}
