//! A tracing session backed by a recording
//!
//! Behaves like a live session as far as the orchestrator can tell: records
//! only flow for providers that have been enabled (kernel records need the
//! kernel logger), pid filters apply, and [`EventSource::process`] keeps
//! blocking after the last record until the session is disposed. Keyword
//! masks and levels are accepted but not used for filtering.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::recording::{read_recording, TraceRecorder};
use crate::capture::{EventSource, SessionFactory, TraceSession};
use crate::domain::{Pid, ReplayError, SessionError};
use crate::events::{Provider, TraceEvent};

const ENABLE_POLL: Duration = Duration::from_millis(1);

/// Enabled providers and their pid filters
#[derive(Debug, Default)]
struct Enabled(Mutex<HashMap<Provider, Option<Pid>>>);

impl Enabled {
    fn enable(&self, provider: Provider, pid_filter: Option<Pid>) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).insert(provider, pid_filter);
    }

    /// `None` while the provider is off, else whether `event` passes its filter
    fn admits(&self, event: &TraceEvent) -> Option<bool> {
        let enabled = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let filter = enabled.get(&event.provider())?;
        Some(filter.map_or(true, |pid| pid == event.pid()))
    }
}

/// Creates [`ReplaySession`]s over one recording
#[derive(Debug, Clone)]
pub struct ReplayFactory {
    events: Arc<[TraceEvent]>,
}

impl ReplayFactory {
    #[must_use]
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self { events: events.into() }
    }

    /// # Errors
    ///
    /// Returns an error if the recording cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Ok(Self::new(read_recording(path)?))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl SessionFactory for ReplayFactory {
    fn create(
        &self,
        name: &str,
        output: Option<&Path>,
    ) -> Result<Box<dyn TraceSession>, SessionError> {
        let recorder = output
            .map(TraceRecorder::create)
            .transpose()
            .map_err(|e| SessionError::CreateFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        info!("Replay session '{name}' over {} records", self.events.len());

        let enabled = Arc::new(Enabled::default());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let source = ReplaySource {
            events: Arc::clone(&self.events),
            enabled: Arc::clone(&enabled),
            stop_rx,
            recorder,
        };
        Ok(Box::new(ReplaySession { enabled, source: Some(source), stop_tx: Some(stop_tx) }))
    }
}

pub struct ReplaySession {
    enabled: Arc<Enabled>,
    source: Option<ReplaySource>,
    /// Dropped on dispose; the source sees the disconnect
    stop_tx: Option<Sender<()>>,
}

impl TraceSession for ReplaySession {
    fn enable_kernel(&mut self, keywords: u64) -> Result<(), SessionError> {
        debug!("Replay: kernel keywords 0x{keywords:x}");
        self.enabled.enable(Provider::Kernel, None);
        Ok(())
    }

    fn enable_provider(
        &mut self,
        provider: Provider,
        level: u8,
        keywords: u64,
        pid_filter: Option<Pid>,
    ) -> Result<(), SessionError> {
        debug!("Replay: {provider} level {level} keywords 0x{keywords:x}");
        self.enabled.enable(provider, pid_filter);
        // The private provider carries the dump markers and rides along
        if provider == Provider::Runtime {
            self.enabled.enable(Provider::PrivateRuntime, pid_filter);
        }
        Ok(())
    }

    fn take_source(&mut self) -> Result<Box<dyn EventSource>, SessionError> {
        match self.source.take() {
            Some(source) => Ok(Box::new(source)),
            None => Err(SessionError::ProcessingFailed("event source already taken".to_string())),
        }
    }

    fn dispose(&mut self) -> Result<(), SessionError> {
        if self.stop_tx.take().is_none() {
            return Err(SessionError::DisposeFailed("session already disposed".to_string()));
        }
        Ok(())
    }
}

pub struct ReplaySource {
    events: Arc<[TraceEvent]>,
    enabled: Arc<Enabled>,
    stop_rx: Receiver<()>,
    recorder: Option<TraceRecorder>,
}

impl ReplaySource {
    /// Wait up to one poll interval; true once the session is disposed
    fn stopped(&self) -> bool {
        !matches!(self.stop_rx.recv_timeout(ENABLE_POLL), Err(RecvTimeoutError::Timeout))
    }

    fn finish(&mut self) -> Result<(), SessionError> {
        if let Some(recorder) = self.recorder.take() {
            let records =
                recorder.finish().map_err(|e| SessionError::ProcessingFailed(e.to_string()))?;
            info!("Recorded {records} trace records");
        }
        Ok(())
    }
}

impl EventSource for ReplaySource {
    fn process(&mut self, handler: &mut dyn FnMut(&TraceEvent)) -> Result<(), SessionError> {
        let events = Arc::clone(&self.events);
        for event in events.iter() {
            let admitted = loop {
                if let Some(admitted) = self.enabled.admits(event) {
                    break admitted;
                }
                if self.stopped() {
                    return self.finish();
                }
            };
            if !admitted {
                continue;
            }
            if let Some(recorder) = &mut self.recorder {
                recorder.record(event).map_err(|e| SessionError::ProcessingFailed(e.to_string()))?;
            }
            handler(event);
        }

        // A live session keeps running until it is disposed
        let _ = self.stop_rx.recv();
        self.finish()
    }
}
