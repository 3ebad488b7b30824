//! Notification hand-off to the host scheduler.
//!
//! The extension can't post notifications itself. Each request is written as
//! one JSON line on stdout and the host schedules it.

use holdfast_core::{HoldfastError, NotificationRequest, NotificationScheduler, Result};
use std::io::{self, Write};
use std::sync::Mutex;

pub struct JsonLinesScheduler<W> {
    out: Mutex<W>,
}

impl JsonLinesScheduler<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesScheduler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write> NotificationScheduler for JsonLinesScheduler<W> {
    fn schedule(&self, request: NotificationRequest) -> Result<()> {
        let line = serde_json::to_string(&request)
            .map_err(|e| HoldfastError::json("serializing notification request", e))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| HoldfastError::InvalidInput("notification writer poisoned".into()))?;
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| HoldfastError::io("writing notification request", e))
    }
}
