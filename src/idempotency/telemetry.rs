//! Engine events.
//!
//! Every decision point emits a named event with a duration measurement and
//! request metadata. Sinks observe only; nothing they do feeds back into the
//! request.

use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{debug, trace};

use super::snapshot::CachedSnapshot;
use super::store::CacheKey;

pub const METRIC_REQUESTS_TOTAL: &str = "idemgate_requests_total";
pub const METRIC_CACHE_GET_MS: &str = "idemgate_cache_get_ms";
pub const METRIC_CACHE_PUT_MS: &str = "idemgate_cache_put_ms";
pub const METRIC_CACHE_ERRORS_TOTAL: &str = "idemgate_cache_errors_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    RequestStart,
    RequestStop,
    RequestException,
    CacheGetStart,
    CacheGetStop,
    CacheGetException,
    CachePutStart,
    CachePutStop,
    CachePutException,
    CacheHit,
    CacheMiss,
    KeyNotSet,
    KeyTooLong,
    RequestMismatch,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestStart => "idemgate.request.start",
            Self::RequestStop => "idemgate.request.stop",
            Self::RequestException => "idemgate.request.exception",
            Self::CacheGetStart => "idemgate.cache_get.start",
            Self::CacheGetStop => "idemgate.cache_get.stop",
            Self::CacheGetException => "idemgate.cache_get.exception",
            Self::CachePutStart => "idemgate.cache_put.start",
            Self::CachePutStop => "idemgate.cache_put.stop",
            Self::CachePutException => "idemgate.cache_put.exception",
            Self::CacheHit => "idemgate.cache_hit",
            Self::CacheMiss => "idemgate.cache_miss",
            Self::KeyNotSet => "idemgate.key_not_set",
            Self::KeyTooLong => "idemgate.key_too_long",
            Self::RequestMismatch => "idemgate.request_mismatch",
        }
    }
}

/// Context attached to an event.
#[derive(Debug, Clone, Copy)]
pub struct EventMetadata<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub idempotency_key: Option<&'a str>,
    pub cache_key: Option<&'a CacheKey>,
    pub cached_response: Option<&'a CachedSnapshot>,
    pub error: Option<&'a (dyn std::error::Error + 'static)>,
    /// Final classification, set only on `RequestStop` and `RequestException`.
    pub outcome: Option<&'static str>,
}

impl<'a> EventMetadata<'a> {
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            idempotency_key: None,
            cache_key: None,
            cached_response: None,
            error: None,
            outcome: None,
        }
    }
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: Event, duration: Duration, metadata: &EventMetadata<'_>);
}

/// Default sink: structured log lines plus counters and latency histograms.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: Event, duration: Duration, metadata: &EventMetadata<'_>) {
        let elapsed_ms = duration.as_secs_f64() * 1000.0;
        trace!(
            event = event.name(),
            elapsed_ms,
            method = metadata.method,
            path = metadata.path,
            cache_key = metadata.cache_key.map(CacheKey::as_str).unwrap_or(""),
            "idempotency event"
        );

        if let Some(outcome) = metadata.outcome {
            counter!(METRIC_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
        }

        match event {
            Event::CacheGetStop => histogram!(METRIC_CACHE_GET_MS).record(elapsed_ms),
            Event::CachePutStop => histogram!(METRIC_CACHE_PUT_MS).record(elapsed_ms),
            Event::CacheGetException | Event::CachePutException => {
                let op = if event == Event::CacheGetException {
                    "get"
                } else {
                    "put"
                };
                counter!(METRIC_CACHE_ERRORS_TOTAL, "op" => op).increment(1);
                debug!(
                    event = event.name(),
                    error = metadata.error.map(ToString::to_string).unwrap_or_default(),
                    "idempotency cache call failed"
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Captures event names for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<(Event, Option<String>)>>,
    }

    impl RecordingSink {
        pub fn names(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(event, _)| event.name())
                .collect()
        }

        pub fn keys(&self) -> Vec<Option<String>> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, key)| key.clone())
                .collect()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn emit(&self, event: Event, _duration: Duration, metadata: &EventMetadata<'_>) {
            self.events
                .lock()
                .unwrap()
                .push((event, metadata.idempotency_key.map(str::to_string)));
        }
    }
}

#[cfg(test)]
mod tests {
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;

    #[test]
    fn event_names_are_namespaced() {
        assert_eq!(Event::RequestStart.name(), "idemgate.request.start");
        assert_eq!(Event::CachePutException.name(), "idemgate.cache_put.exception");
        assert_eq!(Event::RequestMismatch.name(), "idemgate.request_mismatch");
    }

    #[test]
    fn requests_are_counted_once_by_outcome() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let sink = TracingSink;

        metrics::with_local_recorder(&recorder, || {
            let meta = EventMetadata::new("POST", "/orders");
            sink.emit(Event::CacheHit, Duration::ZERO, &meta);
            sink.emit(Event::RequestMismatch, Duration::ZERO, &meta);
            sink.emit(
                Event::RequestStop,
                Duration::ZERO,
                &EventMetadata {
                    outcome: Some("mismatch"),
                    ..meta
                },
            );
        });

        let counts: Vec<(String, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == METRIC_REQUESTS_TOTAL)
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(count) => {
                    let outcome = key.key().labels().next()?.value().to_string();
                    Some((outcome, count))
                }
                _ => None,
            })
            .collect();
        assert_eq!(counts, [("mismatch".to_string(), 1)]);
    }
}
