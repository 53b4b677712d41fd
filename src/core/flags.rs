//! Remote feature flag lookups backed by a per-subject TTL cache.
//!
//! Lookup failures never surface: callers get their default value back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::FlagCache;
use crate::http::{FlagsRequest, Transport};
use crate::types::{Event, FlagValue, Properties};

/// Name of the event recorded for every remote flag resolution.
pub const FEATURE_FLAG_CALLED_EVENT: &str = "$feature_flag_called";

/// Receives the events a resolver records.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

pub struct FlagResolver {
    transport: Arc<dyn Transport>,
    cache: FlagCache,
    sink: EventSink,
}

impl FlagResolver {
    pub fn new(transport: Arc<dyn Transport>, ttl: Duration, sink: EventSink) -> Self {
        Self {
            transport,
            cache: FlagCache::new(ttl),
            sink,
        }
    }

    pub fn cache(&self) -> &FlagCache {
        &self.cache
    }

    /// Resolve one flag for a subject.
    ///
    /// Served from cache while the entry is fresh. Otherwise the flag endpoint
    /// is queried; a resolved value is cached and recorded as a
    /// `$feature_flag_called` event. Any failure, or a flag missing from the
    /// response, yields `default_value`.
    pub async fn get_feature_flag(
        &self,
        key: &str,
        subject_id: &str,
        default_value: Option<FlagValue>,
    ) -> Option<FlagValue> {
        if let Some(value) = self.cache.get(key, subject_id) {
            tracing::trace!(flag = key, "Flag served from cache");
            return Some(value);
        }

        let request = FlagsRequest::single(subject_id, key);
        let mut response = match self.transport.fetch_flags(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(flag = key, error = %e, "Flag lookup failed, using default");
                return default_value;
            }
        };

        match response.flags.remove(key) {
            Some(value) => {
                self.cache.set(key, subject_id, value.clone());
                (self.sink)(flag_called_event(key, subject_id, &value));
                Some(value)
            }
            None => default_value,
        }
    }

    /// Fetch every flag for a subject. Not cached; empty on failure.
    pub async fn get_all_flags(&self, subject_id: &str) -> HashMap<String, FlagValue> {
        match self.transport.fetch_flags(&FlagsRequest::all(subject_id)).await {
            Ok(response) => response.flags,
            Err(e) => {
                tracing::debug!(error = %e, "Flag listing failed");
                HashMap::new()
            }
        }
    }

    /// Resolve a flag without default and apply [`FlagValue::is_enabled`].
    pub async fn is_feature_enabled(&self, key: &str, subject_id: &str) -> bool {
        self.get_feature_flag(key, subject_id, None)
            .await
            .map(|value| value.is_enabled())
            .unwrap_or(false)
    }
}

fn flag_called_event(key: &str, subject_id: &str, value: &FlagValue) -> Event {
    let mut properties = Properties::new();
    properties.insert("$feature_flag".to_string(), serde_json::Value::from(key));
    properties.insert("$feature_flag_response".to_string(), value.to_json());
    Event::track(subject_id, FEATURE_FLAG_CALLED_EVENT, Some(properties))
}
