//! Line relay — the glue between stdin/stdout and the bus.
//!
//! Each input line is `<subject> <payload>`. Subscribed subjects are written
//! to an output sink as `<subject>: <payload>`. Empty subjects are rejected
//! here; the bus itself accepts them.

use std::io::Write;
use std::time::Duration;

use subpub::{Bus, BusError, Subscription};
use tracing::{debug, error, info};

/// Errors surfaced to the relay's caller.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The subject was empty.
    #[error("subject is required")]
    EmptySubject,

    /// The bus rejected the operation.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Split a line into subject and payload at the first space.
///
/// A line without a space is a subject with an empty payload.
#[must_use]
pub fn parse_line(line: &str) -> (&str, &str) {
    let line = line.trim_end_matches(['\r', '\n']);
    line.split_once(' ').unwrap_or((line, ""))
}

/// Forwards lines onto a bus and bus deliveries onto writers.
#[derive(Debug)]
pub struct Relay {
    bus: Bus<String>,
    subscriptions: Vec<Subscription<String>>,
}

impl Relay {
    /// Create a relay over `bus`.
    #[must_use]
    pub fn new(bus: Bus<String>) -> Self {
        Self {
            bus,
            subscriptions: Vec::new(),
        }
    }

    /// Forward every message on `subject` to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::EmptySubject`] for an empty subject, or
    /// [`RelayError::Bus`] if the bus is closed.
    pub fn subscribe<W>(&mut self, subject: &str, mut out: W) -> Result<(), RelayError>
    where
        W: Write + Send + 'static,
    {
        if subject.is_empty() {
            return Err(RelayError::EmptySubject);
        }

        let key = subject.to_string();
        let sub = self.bus.subscribe(subject, move |payload: String| {
            if let Err(e) = writeln!(out, "{key}: {payload}").and_then(|()| out.flush()) {
                error!(subject = key, %e, "failed to forward message");
            }
        })?;

        info!(subject, subscription_id = %sub.id(), "new subscription");
        self.subscriptions.push(sub);
        Ok(())
    }

    /// Publish one input line.
    ///
    /// Returns how many subscribers accepted the payload.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::EmptySubject`] if the line has no subject, or
    /// [`RelayError::Bus`] if the bus is closed.
    pub fn handle_line(&self, line: &str) -> Result<usize, RelayError> {
        let (subject, payload) = parse_line(line);
        if subject.is_empty() {
            return Err(RelayError::EmptySubject);
        }

        let accepted = self.bus.publish(subject, payload.to_string())?;
        debug!(subject, payload, accepted, "published event");
        Ok(accepted)
    }

    /// Returns the number of subjects this relay forwards.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Drop the relay's subscriptions and close the bus.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DeadlineExceeded`] if deliveries were still running
    /// after `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), BusError> {
        for sub in &self.subscriptions {
            sub.unsubscribe();
        }
        self.bus.close(timeout).await
    }
}
