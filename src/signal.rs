//! Lifecycle signals forwarded from the rendered page to the host.
//!
//! The page instrumentation reports everything it sees through a single
//! binding as JSON messages tagged by `kind`. The host consumes them through
//! the [`EventSource`] trait so the pipeline can be driven either by a live
//! browser ([`ChannelEventSource`]) or by a recorded trace ([`ScriptedSource`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// A message emitted by the page instrumentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PageSignal {
    /// The framework global was missing at `DOMContentLoaded`
    NoFramework,
    /// A component is initializing; `markup` is its untouched outer HTML
    InitStart { id: String, markup: String },
    /// The application finished creating components
    AppLoaded { ids: Vec<String> },
    /// A component's data settled, successfully or not
    DataLoaded {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// One batch of DOM mutations inside a component subtree
    Mutation {
        #[serde(default)]
        count: u32,
    },
    /// Forwarded console output (verbose mode only)
    Console { level: String, text: String },
    /// Uncaught page error
    PageError { message: String },
}

/// A signal stamped with the host time it arrived at.
#[derive(Debug, Clone)]
pub struct Timed {
    pub at: Instant,
    pub signal: PageSignal,
}

/// Decode a binding payload into a signal.
///
/// Depending on how the binding was installed the payload is either the raw
/// message, a JSON string holding it, or a `{name, seq, args}` envelope whose
/// first argument is the message.
pub fn decode_binding_payload(payload: serde_json::Value) -> Option<PageSignal> {
    use serde_json::Value;
    match payload {
        Value::String(s) => serde_json::from_str::<Value>(&s).ok().and_then(decode_binding_payload),
        Value::Object(ref map) if map.contains_key("kind") => serde_json::from_value(payload).ok(),
        Value::Object(mut map) => match map.remove("args") {
            Some(Value::Array(mut args)) if !args.is_empty() => decode_binding_payload(args.swap_remove(0)),
            _ => None,
        },
        _ => None,
    }
}

/// Source of page signals consumed by the render pipeline.
pub trait EventSource {
    /// Current time on this source's clock
    fn now(&self) -> Instant;

    /// Wait for the next signal, giving up at `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passed without a signal.
    fn next_before(&mut self, deadline: Instant) -> Result<Option<Timed>>;
}

/// What travels over the signal channel.
enum Feed {
    Signal(Timed),
    /// The browser side died; no further signals will come
    Lost(String),
}

/// Sending half handed to the browser binding.
#[derive(Clone)]
pub struct SignalSender {
    tx: Sender<Feed>,
}

impl SignalSender {
    /// Stamp and forward a signal. Returns `false` once the pipeline is gone.
    pub fn send(&self, signal: PageSignal) -> bool {
        self.tx.send(Feed::Signal(Timed { at: Instant::now(), signal })).is_ok()
    }

    /// Report that the page target crashed or detached.
    ///
    /// The waiting pipeline fails with [`Error::BrowserSession`] instead of
    /// running into the last-resort timeout.
    pub fn session_lost(&self, reason: impl Into<String>) -> bool {
        self.tx.send(Feed::Lost(reason.into())).is_ok()
    }
}

/// Receiving half backed by an `mpsc` channel and the wall clock.
pub struct ChannelEventSource {
    rx: Receiver<Feed>,
}

/// Create a connected sender/source pair.
pub fn channel() -> (SignalSender, ChannelEventSource) {
    let (tx, rx) = mpsc::channel();
    (SignalSender { tx }, ChannelEventSource { rx })
}

impl EventSource for ChannelEventSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn next_before(&mut self, deadline: Instant) -> Result<Option<Timed>> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.rx.recv_timeout(wait) {
            Ok(Feed::Signal(timed)) => Ok(Some(timed)),
            Ok(Feed::Lost(reason)) => Err(Error::BrowserSession(format!("Page target lost: {}", reason))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::BrowserSession("page signal channel closed".into()))
            }
        }
    }
}

/// A replayable signal trace running on a virtual clock.
///
/// Waiting never sleeps: the clock jumps to the next scripted signal, or to
/// the deadline when none is due before it. Used by tests and benches.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    origin: Instant,
    clock: Instant,
    events: VecDeque<(Duration, PageSignal)>,
}

impl ScriptedSource {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            clock: origin,
            events: VecDeque::new(),
        }
    }

    /// Schedule `signal` at `offset_ms` after the origin.
    pub fn at(mut self, offset_ms: u64, signal: PageSignal) -> Self {
        let offset = Duration::from_millis(offset_ms);
        let pos = self.events.iter().position(|(o, _)| *o > offset).unwrap_or(self.events.len());
        self.events.insert(pos, (offset, signal));
        self
    }

    /// Schedule a mutation batch every `step_ms` in `[from_ms, until_ms]`.
    pub fn mutations(mut self, from_ms: u64, until_ms: u64, step_ms: u64) -> Self {
        let mut t = from_ms;
        while t <= until_ms {
            self = self.at(t, PageSignal::Mutation { count: 1 });
            t += step_ms.max(1);
        }
        self
    }

    /// Virtual time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        self.clock.saturating_duration_since(self.origin)
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedSource {
    fn now(&self) -> Instant {
        self.clock
    }

    fn next_before(&mut self, deadline: Instant) -> Result<Option<Timed>> {
        let due = matches!(self.events.front(), Some((offset, _)) if self.origin + *offset <= deadline);
        if due {
            if let Some((offset, signal)) = self.events.pop_front() {
                let at = (self.origin + offset).max(self.clock);
                self.clock = at;
                return Ok(Some(Timed { at, signal }));
            }
        }
        self.clock = self.clock.max(deadline);
        Ok(None)
    }
}
