//! Diagnostic logging
//!
//! Everything goes to stdout through `tracing_subscriber::fmt`. Events from
//! this crate are additionally mirrored to the attached subscriber as
//! `application-log` messages, so the UI can show what the relay is doing.
//! Events from dependencies are not mirrored: the WebSocket stack logs about
//! the very frames the mirror produces.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::error::{RelayError, Result};
use crate::push::protocol::ServerMessage;
use crate::push::subscriber::SubscriberSlot;

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `MakeWriter` that tees formatted events to stdout and the push channel
#[derive(Debug, Clone)]
pub struct MirrorWriter {
    slot: Arc<SubscriberSlot>,
}

impl MirrorWriter {
    pub fn new(slot: Arc<SubscriberSlot>) -> Self {
        Self { slot }
    }
}

impl<'a> MakeWriter<'a> for MirrorWriter {
    type Writer = MirrorLine;

    fn make_writer(&'a self) -> Self::Writer {
        MirrorLine::new(None)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        if meta.target().starts_with(CRATE_TARGET) {
            MirrorLine::new(Some(Arc::clone(&self.slot)))
        } else {
            MirrorLine::new(None)
        }
    }
}

/// Buffers one formatted event and emits it when dropped
pub struct MirrorLine {
    buf: Vec<u8>,
    mirror: Option<Arc<SubscriberSlot>>,
}

impl MirrorLine {
    fn new(mirror: Option<Arc<SubscriberSlot>>) -> Self {
        Self {
            buf: Vec::new(),
            mirror,
        }
    }
}

impl Write for MirrorLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MirrorLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }

        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(&self.buf);
        let _ = stdout.flush();
        drop(stdout);

        if let Some(slot) = &self.mirror {
            let text = String::from_utf8_lossy(&self.buf);
            let message = ServerMessage::ApplicationLog {
                message: text.trim_end(),
            };
            // Failures here must not log, or the mirror would feed itself
            if let Ok(json) = message.to_json() {
                let _ = slot.send(json);
            }
        }
    }
}

/// Build the filter: `RUST_LOG` wins, `level` applies to this crate.
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    let directive = format!("{}={}", CRATE_TARGET, level)
        .parse::<Directive>()
        .map_err(|e| RelayError::ConfigError {
            message: format!("Invalid log level '{}': {}", level, e),
        })?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

/// Install the global subscriber
pub fn init(level: &str, slot: Arc<SubscriberSlot>) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level)?)
        .with_ansi(false)
        .with_writer(MirrorWriter::new(slot))
        .try_init();
    Ok(())
}
