//! Host-side render pipeline.
//!
//! Consumes page signals, feeds the lifecycle probe, runs the quiescence
//! debouncer once every component's data settled, and embeds the snapshot
//! when the page goes quiet. The last-resort deadline bounds the whole pass.

use crate::embed::{embed, Completion, PageSink};
use crate::probe::{LifecycleProbe, ProbeEvent};
use crate::quiesce::{Debouncer, Phase};
use crate::signal::{EventSource, PageSignal, Timed};
use crate::{RenderOptions, Result};
use log::{debug, info, warn};
use std::time::Instant;

/// How a pipeline pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed(Completion),
    TimedOut,
}

/// Drive one page from its first signal to completion or `deadline`.
pub fn drive<S, K>(
    source: &mut S,
    sink: &mut K,
    options: &RenderOptions,
    deadline: Instant,
) -> Result<PipelineOutcome>
where
    S: EventSource + ?Sized,
    K: PageSink + ?Sized,
{
    let mut probe = LifecycleProbe::new(options.snapshot_policy);
    let mut quiet = Debouncer::new(options.poll_timeout());

    loop {
        let wait_until = quiet.deadline().map_or(deadline, |fire_at| fire_at.min(deadline));
        let next = source.next_before(wait_until)?;
        let now = next.as_ref().map_or_else(|| source.now(), |timed| timed.at);

        // the timer may have fired before this signal arrived
        if quiet.poll(now) == Phase::Stable {
            debug!(
                "Page quiescent after {} mutation reset(s); embedding {} snapshot(s)",
                quiet.resets(),
                probe.snapshots().len()
            );
            let completion = embed(sink, probe.into_store().into_snapshots(), options)?;
            return Ok(PipelineOutcome::Completed(completion));
        }
        if now >= deadline {
            return Ok(PipelineOutcome::TimedOut);
        }

        let Some(Timed { at, signal }) = next else {
            continue;
        };

        match probe.handle(&signal) {
            ProbeEvent::FrameworkAbsent => {
                debug!("No framework detected on page");
                return Ok(PipelineOutcome::Completed(Completion::framework_absent()));
            }
            ProbeEvent::Settled => {
                debug!("Component data settled; watching for mutations");
                quiet.start(at);
            }
            ProbeEvent::AppLoaded | ProbeEvent::Nothing => {}
        }

        match signal {
            PageSignal::Mutation { .. } => {
                quiet.on_activity(at);
            }
            PageSignal::Console { level, text } => info!("PAGE LOG: [{}] {}", level, text),
            PageSignal::PageError { message } => warn!("PAGE ERR: {}", message),
            _ => {}
        }
    }
}
