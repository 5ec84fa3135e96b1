//! Event Sources
//!
//! Producers that feed sports events into the hub through the
//! [`EventSink`] port.
//!
//! - [`SyntheticEventSource`]: fixed-interval generator
//! - [`UpstreamFeedSource`]: live upstream WebSocket feed with heartbeat
//!   and reconnect
//!
//! Both report progress through a shared [`FeedState`] that the health
//! server exposes.

pub mod backoff;
pub mod heartbeat;
pub mod state;
pub mod synthetic;
pub mod upstream;

pub use state::{FeedSnapshot, FeedState, FeedStatus};
pub use synthetic::SyntheticEventSource;
pub use upstream::{FeedConnectionError, UpstreamFeedSource};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, EventSource};
use crate::domain::connection::DeliveryReport;
use crate::domain::events::SportsEvent;
use crate::infrastructure::config::{ConfigError, EventSourceKind, HubConfig};
use crate::infrastructure::metrics;

/// Build the configured event source, if any.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] if the upstream source is
/// selected without a URL.
pub fn build_event_source(
    config: &HubConfig,
    state: Arc<FeedState>,
) -> Result<Option<Arc<dyn EventSource>>, ConfigError> {
    let source: Arc<dyn EventSource> = match config.event_source {
        EventSourceKind::Synthetic => {
            Arc::new(SyntheticEventSource::new(config.synthetic.clone(), state))
        }
        EventSourceKind::Upstream => {
            let url = config
                .feed
                .upstream_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingEnvVar("SPORTS_HUB_UPSTREAM_URL".to_string()))?;
            Arc::new(UpstreamFeedSource::new(url, &config.feed, state))
        }
        EventSourceKind::None => {
            tracing::warn!("No event source configured, serving client commands only");
            return Ok(None);
        }
    };
    Ok(Some(source))
}

/// Run `source` into `sink` on its own task until `cancel` fires.
///
/// A source that gives up is logged; the task then ends.
pub fn spawn_event_source(
    source: Arc<dyn EventSource>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = source.run(sink, cancel).await {
            tracing::error!(source = source.name(), error = %e, "Event source stopped");
        }
    })
}

/// Publish one event and record it against the source.
fn emit(sink: &dyn EventSink, state: &FeedState, event: &SportsEvent) -> DeliveryReport {
    state.record_event();
    let report = sink.publish(event);

    metrics::record_event_emitted(state.source(), event.type_name());
    tracing::debug!(
        source = state.source(),
        event_type = event.type_name(),
        delivered = report.delivered,
        failed = report.failed,
        "Event published"
    );

    report
}
