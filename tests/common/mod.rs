#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use telemetry::{
    Event, FlagValue, FlagsRequest, FlagsResponse, Result, TelemetryError, TelemetryOptions,
    Transport,
};
use tokio::sync::Semaphore;

/// In-memory transport that records every batch it is handed.
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Vec<Event>>>,
    statuses: Mutex<VecDeque<u16>>,
    flags: Mutex<HashMap<String, FlagValue>>,
    flag_requests: AtomicUsize,
    gate: Option<Semaphore>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every send waits for a permit from [`RecordingTransport::release`].
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    /// Fail the next sends with these statuses, in order.
    pub fn with_statuses(statuses: &[u16]) -> Arc<Self> {
        let transport = Self::default();
        transport.statuses.lock().extend(statuses.iter().copied());
        Arc::new(transport)
    }

    pub fn with_flags(flags: &[(&str, FlagValue)]) -> Arc<Self> {
        let transport = Self::default();
        transport
            .flags
            .lock()
            .extend(flags.iter().map(|(k, v)| (k.to_string(), v.clone())));
        Arc::new(transport)
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().clone()
    }

    pub fn send_calls(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn delivered_names(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter_map(|e| e.name().map(str::to_string))
            .collect()
    }

    pub fn flag_requests(&self) -> usize {
        self.flag_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_events(&self, events: &[Event]) -> Result<()> {
        self.batches.lock().push(events.to_vec());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match self.statuses.lock().pop_front() {
            Some(status) => Err(TelemetryError::http_status(status, "")),
            None => Ok(()),
        }
    }

    async fn fetch_flags(&self, request: &FlagsRequest) -> Result<FlagsResponse> {
        self.flag_requests.fetch_add(1, Ordering::SeqCst);
        let flags = self.flags.lock();
        let flags = match &request.keys {
            Some(keys) => keys
                .iter()
                .filter_map(|k| flags.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
            None => flags.clone(),
        };
        Ok(FlagsResponse { flags })
    }
}

pub fn options() -> TelemetryOptions {
    TelemetryOptions::new("tk_test_key")
}
