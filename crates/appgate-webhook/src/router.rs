//! Event routing
//!
//! Handlers are registered at setup time against a filter and run in
//! registration order for every matching event. A failing handler never
//! stops the ones registered after it.

use crate::events::VerifiedEvent;
use crate::{Result, WebhookError};
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(panic = "abort")]
compile_error!("handler isolation needs panic = \"unwind\"");

/// Webhook event handler
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a verified event
    async fn handle(&self, event: &VerifiedEvent) -> Result<()>;

    /// Name used in logs and failure reports
    fn name(&self) -> &str;
}

/// Which events a handler receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event (`*`)
    Any,
    /// Every action of one event type (`issues`)
    Event(String),
    /// One action of one event type (`issues.opened`)
    EventAction { event: String, action: String },
}

impl EventFilter {
    pub fn parse(filter: &str) -> Self {
        if filter == "*" {
            return Self::Any;
        }
        match filter.split_once('.') {
            Some((event, action)) => Self::EventAction {
                event: event.to_string(),
                action: action.to_string(),
            },
            None => Self::Event(filter.to_string()),
        }
    }

    pub fn matches(&self, event: &VerifiedEvent) -> bool {
        match self {
            Self::Any => true,
            Self::Event(event_type) => event.event_type == *event_type,
            Self::EventAction {
                event: event_type,
                action,
            } => event.event_type == *event_type && event.action.as_deref() == Some(action),
        }
    }
}

impl From<&str> for EventFilter {
    fn from(filter: &str) -> Self {
        Self::parse(filter)
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Event(event) => write!(f, "{event}"),
            Self::EventAction { event, action } => write!(f, "{event}.{action}"),
        }
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as an [`EventHandler`]
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<FnHandler<F>>
where
    F: Fn(VerifiedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(VerifiedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &VerifiedEvent) -> Result<()> {
        (self.f)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Route {
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
}

/// A handler that did not complete
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: WebhookError,
}

/// Outcome of dispatching one event
#[derive(Debug)]
pub struct RouterResult {
    pub event_type: String,
    pub delivery_id: Option<String>,
    pub invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl RouterResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered handler table
#[derive(Default)]
pub struct EventRouter {
    routes: Vec<Route>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a filter (`"issues"`, `"issues.opened"` or `"*"`)
    pub fn on(
        &mut self,
        filter: impl Into<EventFilter>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        let filter = filter.into();
        info!(filter = %filter, handler = handler.name(), "Registering event handler");
        self.routes.push(Route { filter, handler });
        self
    }

    pub fn handler_count(&self) -> usize {
        self.routes.len()
    }

    /// Whether any handler would receive this event
    pub fn has_handlers_for(&self, event: &VerifiedEvent) -> bool {
        self.routes.iter().any(|r| r.filter.matches(event))
    }

    /// Run every matching handler once, in registration order
    pub async fn dispatch(&self, event: &VerifiedEvent) -> RouterResult {
        let mut result = RouterResult {
            event_type: event.event_type.clone(),
            delivery_id: event.delivery_id.clone(),
            invoked: 0,
            failures: Vec::new(),
        };

        for route in self.routes.iter().filter(|r| r.filter.matches(event)) {
            let name = route.handler.name().to_string();
            result.invoked += 1;

            let outcome = AssertUnwindSafe(route.handler.handle(event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    debug!(handler = %name, event = %event.key(), "Handler completed");
                }
                Ok(Err(error)) => {
                    warn!(handler = %name, event = %event.key(), error = %error, "Handler failed");
                    result.failures.push(HandlerFailure {
                        handler: name,
                        error,
                    });
                }
                Err(_) => {
                    warn!(handler = %name, event = %event.key(), "Handler panicked");
                    result.failures.push(HandlerFailure {
                        handler: name,
                        error: WebhookError::Handler("handler panicked".to_string()),
                    });
                }
            }
        }

        if result.invoked == 0 {
            debug!(event = %event.key(), "No handlers registered for event");
        }

        result
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|r| format!("{} -> {}", r.filter, r.handler.name())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records handler invocations in order
    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: &str) {
            self.0.lock().unwrap().push(entry.to_string());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn explode() -> Result<()> {
        panic!("handler bug")
    }

    fn recording(log: &Arc<Log>, name: &'static str) -> Arc<dyn EventHandler> {
        let log = log.clone();
        handler_fn(name, move |_event| {
            let log = log.clone();
            async move {
                log.push(name);
                Ok(())
            }
        })
    }

    fn failing(log: &Arc<Log>, name: &'static str) -> Arc<dyn EventHandler> {
        let log = log.clone();
        handler_fn(name, move |_event| {
            let log = log.clone();
            async move {
                log.push(name);
                Err(WebhookError::Handler("boom".to_string()))
            }
        })
    }

    fn issue_event(action: &str) -> VerifiedEvent {
        VerifiedEvent::new(
            "issues",
            json!({ "action": action, "installation": { "id": 42 } }),
        )
        .with_delivery_id("d-1")
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!(EventFilter::parse("*"), EventFilter::Any);
        assert_eq!(
            EventFilter::parse("issues"),
            EventFilter::Event("issues".to_string())
        );
        assert_eq!(
            EventFilter::parse("issues.opened"),
            EventFilter::EventAction {
                event: "issues".to_string(),
                action: "opened".to_string()
            }
        );
        assert_eq!(EventFilter::parse("issues.opened").to_string(), "issues.opened");
    }

    #[test]
    fn test_filter_matching() {
        let opened = issue_event("opened");
        let closed = issue_event("closed");

        assert!(EventFilter::parse("*").matches(&opened));
        assert!(EventFilter::parse("issues").matches(&closed));
        assert!(EventFilter::parse("issues.opened").matches(&opened));
        assert!(!EventFilter::parse("issues.opened").matches(&closed));
        assert!(!EventFilter::parse("pull_request").matches(&opened));
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let log = Arc::new(Log::default());
        let mut router = EventRouter::new();
        router
            .on("issues", recording(&log, "first"))
            .on("*", recording(&log, "second"))
            .on("issues.opened", recording(&log, "third"))
            .on("issues.closed", recording(&log, "skipped"));

        let result = router.dispatch(&issue_event("opened")).await;

        assert!(result.is_success());
        assert_eq!(result.invoked, 3);
        assert_eq!(result.event_type, "issues");
        assert_eq!(result.delivery_id.as_deref(), Some("d-1"));
        assert_eq!(log.entries(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_handlers() {
        let log = Arc::new(Log::default());
        let mut router = EventRouter::new();
        router
            .on("issues", failing(&log, "broken"))
            .on("issues", recording(&log, "after"));

        let result = router.dispatch(&issue_event("opened")).await;

        assert!(!result.is_success());
        assert_eq!(result.invoked, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].handler, "broken");
        assert_eq!(log.entries(), vec!["broken", "after"]);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let log = Arc::new(Log::default());
        let mut router = EventRouter::new();
        router
            .on(
                "issues",
                handler_fn("panics", |_event| async move { explode() }),
            )
            .on("issues", recording(&log, "after"));

        let result = router.dispatch(&issue_event("opened")).await;

        assert_eq!(result.failures.len(), 1);
        assert!(matches!(result.failures[0].error, WebhookError::Handler(_)));
        assert_eq!(log.entries(), vec!["after"]);
    }

    #[test]
    fn test_release_profile_unwinds() {
        let manifest = include_str!("../../../Cargo.toml");
        let release = manifest
            .split("[profile.release]")
            .nth(1)
            .and_then(|rest| rest.split("\n[").next())
            .unwrap();

        assert!(release.contains("panic = \"unwind\""));
        assert!(!release.contains("panic = \"abort\""));
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_ignored() {
        let log = Arc::new(Log::default());
        let mut router = EventRouter::new();
        router.on("issues", recording(&log, "issues"));

        let event = VerifiedEvent::new("sponsorship", json!({ "action": "created" }));
        assert!(!router.has_handlers_for(&event));

        let result = router.dispatch(&event).await;
        assert!(result.is_success());
        assert_eq!(result.invoked, 0);
        assert!(log.entries().is_empty());
    }
}
