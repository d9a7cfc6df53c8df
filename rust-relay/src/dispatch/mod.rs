//! Fan-out of accepted events to downstream destinations.
//!
//! ```text
//!                  ┌─> Make.com ──┐
//! event ─> dispatch┤              ├─> DispatchResult
//!                  └─> IFTTT ─────┘
//! ```
//!
//! Every active destination gets its own task. The dispatcher waits for all
//! of them to settle and reports one outcome per destination, in the order
//! given by [`DestinationChoice::destinations`].

pub mod destination;
pub mod sender;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, SendError};

pub use destination::{
    Destination, DestinationChoice, DestinationConfig, DestinationEndpoint, DestinationTarget,
};
pub use sender::send_to_destination;

/// What happened when forwarding to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub destination: Destination,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn delivered(destination: Destination, status_code: u16, response_body: String) -> Self {
        Self {
            destination,
            success: true,
            status_code: Some(status_code),
            response_body: Some(response_body),
            error: None,
        }
    }

    pub fn failed(
        destination: Destination,
        status_code: Option<u16>,
        response_body: Option<String>,
        error: &SendError,
    ) -> Self {
        Self {
            destination,
            success: false,
            status_code,
            response_body,
            error: Some(error.to_string()),
        }
    }
}

/// Overall shape of a [`DispatchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSummary {
    Delivered,
    Partial,
    Failed,
}

impl DispatchSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchSummary::Delivered => "delivered",
            DispatchSummary::Partial => "partial",
            DispatchSummary::Failed => "failed",
        }
    }
}

/// Ordered outcomes for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DispatchResult {
    outcomes: Vec<DispatchOutcome>,
}

impl DispatchResult {
    pub fn new(outcomes: Vec<DispatchOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[DispatchOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// `true` when there was at least one send and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.is_empty() && self.succeeded() == 0
    }

    pub fn summary(&self) -> DispatchSummary {
        if self.all_failed() {
            DispatchSummary::Failed
        } else if self.succeeded() == self.outcomes.len() {
            DispatchSummary::Delivered
        } else {
            DispatchSummary::Partial
        }
    }
}

/// Sends events to the configured destinations.
///
/// Cheap to clone; the HTTP client and destination set are shared.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    destinations: Arc<DestinationConfig>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with its own connection-pooled HTTP client.
    pub fn new(destinations: DestinationConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self::with_client(client, destinations, timeout))
    }

    pub fn with_client(client: Client, destinations: DestinationConfig, timeout: Duration) -> Self {
        Self {
            client,
            destinations: Arc::new(destinations),
            timeout,
        }
    }

    /// Forward `event` to every active destination and wait for all of them.
    ///
    /// Sends run as spawned tasks, so they finish even if the caller is
    /// dropped midway (for example when the inbound client disconnects).
    pub async fn dispatch(&self, event: &Value) -> DispatchResult {
        let targets = self.destinations.targets();

        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "dispatch_serialize_failed");
                let err = SendError::Serialize(e.to_string());
                return DispatchResult::new(
                    targets
                        .iter()
                        .map(|t| DispatchOutcome::failed(t.destination, None, None, &err))
                        .collect(),
                );
            }
        };

        info!(
            choice = self.destinations.choice().as_str(),
            destinations = targets.len(),
            body_length = body.len(),
            "dispatch_starting"
        );

        let tasks: Vec<_> = targets
            .iter()
            .map(|target| {
                let client = self.client.clone();
                let target = target.clone();
                let body = body.clone();
                let timeout = self.timeout;
                tokio::spawn(async move { send_to_destination(&client, &target, body, timeout).await })
            })
            .collect();

        let settled = join_all(tasks).await;

        let outcomes: Vec<DispatchOutcome> = targets
            .iter()
            .zip(settled)
            .map(|(target, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(destination = target.destination.name(), error = %e, "dispatch_task_failed");
                    DispatchOutcome::failed(
                        target.destination,
                        None,
                        None,
                        &SendError::Aborted(e.to_string()),
                    )
                }
            })
            .collect();

        let result = DispatchResult::new(outcomes);

        info!(
            destinations = result.len(),
            succeeded = result.succeeded(),
            summary = result.summary().as_str(),
            "dispatch_complete"
        );

        result
    }
}
