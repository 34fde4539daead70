//! The tracing facility, seen from the capture
//!
//! An OS tracing session is an external resource: it is created, has
//! providers enabled on it, delivers records through a blocking call on some
//! thread, and must be disposed exactly once. These traits are the seam
//! between that resource and the capture logic; [`crate::replay`] implements
//! them over a recorded trace.

use std::path::Path;

use crate::domain::{Pid, SessionError};
use crate::events::{Provider, TraceEvent};

/// Blocking, push-style record delivery
pub trait EventSource: Send {
    /// Call `handler` for every record until the stream ends or the owning
    /// session is disposed.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery itself fails.
    fn process(&mut self, handler: &mut dyn FnMut(&TraceEvent)) -> Result<(), SessionError>;
}

pub trait TraceSession: Send {
    /// # Errors
    ///
    /// Returns [`SessionError::EnableFailed`] if the kernel logger rejects the keywords.
    fn enable_kernel(&mut self, keywords: u64) -> Result<(), SessionError>;

    /// Enable a user-mode provider, optionally restricted to one process
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EnableFailed`] if the provider cannot be enabled.
    fn enable_provider(
        &mut self,
        provider: Provider,
        level: u8,
        keywords: u64,
        pid_filter: Option<Pid>,
    ) -> Result<(), SessionError>;

    /// Hand out the session's record stream; only one can be taken
    ///
    /// # Errors
    ///
    /// Returns an error if the source was already taken.
    fn take_source(&mut self) -> Result<Box<dyn EventSource>, SessionError>;

    /// Stop the session, making a blocked [`EventSource::process`] return
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DisposeFailed`] if the session cannot be stopped.
    fn dispose(&mut self) -> Result<(), SessionError>;
}

/// Creates sessions; `output` asks the session to persist the raw trace
pub trait SessionFactory {
    /// # Errors
    ///
    /// Returns [`SessionError::CreateFailed`] if the session cannot be created.
    fn create(
        &self,
        name: &str,
        output: Option<&Path>,
    ) -> Result<Box<dyn TraceSession>, SessionError>;
}
