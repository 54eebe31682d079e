//! Remote Requests
//!
//! Every call to the copilot service goes through [`RemoteInvoker::invoke`].
//! The invoker counts requests in flight and turns failures into alerts on
//! the bus:
//!
//! - 401 raises an "Unauthorized" alert that redirects to login
//! - 403 raises an "Access denied" alert that redirects to login
//! - anything else raises an "Unpredicted error" alert, unless the caller
//!   handles the failure itself ([`InvokeOptions::disable_alert`])
//!
//! The error is always returned to the caller as well.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{FailureKind, RemoteError};
use crate::bus::EventBus;
use crate::events::CopilotEvent;
use crate::messages::{Alert, AlertKind};

/// Per-call options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Suppress the generic alert for non-auth failures
    pub disable_alert: bool,
}

impl InvokeOptions {
    /// Options for a caller that renders its own failure UI
    #[must_use]
    pub fn handled_inline() -> Self {
        Self {
            disable_alert: true,
        }
    }
}

/// Issues remote requests and reports their lifecycle on the bus
#[derive(Clone)]
pub struct RemoteInvoker {
    bus: EventBus,
    in_flight: Arc<AtomicUsize>,
}

impl RemoteInvoker {
    /// Create an invoker publishing to `bus`
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Requests currently awaiting a response
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Await `request`, keeping the in-flight count and raising alerts
    pub async fn invoke<T, Fut>(&self, request: Fut, options: InvokeOptions) -> Result<T, RemoteError>
    where
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _guard = InFlightGuard::enter(self);
        let result = request.await;
        if let Err(err) = &result {
            self.report(err, options);
        }
        result
    }

    fn report(&self, err: &RemoteError, options: InvokeOptions) {
        let alert = match err.kind() {
            FailureKind::Unauthorized => Alert::new(AlertKind::Unauthorized, err.to_string()),
            FailureKind::Forbidden => Alert::new(AlertKind::AccessDenied, err.to_string()),
            FailureKind::Transient if options.disable_alert => {
                tracing::debug!(error = %err, "Remote request failed; caller handles it");
                return;
            }
            FailureKind::Transient => Alert::new(AlertKind::Unpredicted, err.to_string()),
        };

        tracing::warn!(error = %err, alert = ?alert.kind, "Remote request failed");
        self.bus.publish(CopilotEvent::Alert(alert));
    }
}

/// Decrements the in-flight count on every exit path, including cancellation
struct InFlightGuard<'a> {
    invoker: &'a RemoteInvoker,
}

impl<'a> InFlightGuard<'a> {
    fn enter(invoker: &'a RemoteInvoker) -> Self {
        let count = invoker.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        invoker.bus.publish(CopilotEvent::RequestsInFlight(count));
        Self { invoker }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let count = self.invoker.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        self.invoker
            .bus
            .publish(CopilotEvent::RequestsInFlight(count));
    }
}
