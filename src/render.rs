//! Render orchestration.
//!
//! One call owns one fresh [`Session`] from launch to teardown. Setup runs in
//! a fixed order (signal binding, request filter, instrumentation, then
//! navigation) so no early lifecycle signal can be missed.

use crate::pipeline::{drive, PipelineOutcome};
use crate::script::instrumentation_script;
use crate::signal;
use crate::{RenderOptions, RenderOutcome, RenderResult, Result, Session};
use log::{info, warn};
use std::time::Instant;

enum Finished {
    TimedOut,
    Rendered { content: String, has_framework: bool },
}

/// Render `url` in a fresh session of type `S`.
///
/// Hard failures (launch, navigation, page scripting) are errors; running
/// into the last-resort timeout is [`RenderOutcome::TimedOut`]. The session
/// is closed on every path.
pub fn render_with<S: Session>(url: &str, options: &RenderOptions) -> Result<RenderOutcome> {
    options.validate()?;
    let started = Instant::now();
    let deadline = started + options.last_resort_timeout();

    let mut session = S::launch(options)?;
    let finished = run_session(&mut session, url, options, deadline);
    if let Err(e) = session.close() {
        warn!("Failed to close browser session for {}: {}", url, e);
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match finished? {
        Finished::TimedOut => {
            info!("Headless timed out waiting for render of page {}!", url);
            Ok(RenderOutcome::TimedOut { elapsed_ms })
        }
        Finished::Rendered { content, has_framework } => {
            info!(
                "Headless rendered page {} ({} framework) to {} chars in {}ms",
                url,
                if has_framework { "with" } else { "without" },
                content.len(),
                elapsed_ms
            );
            Ok(RenderOutcome::Rendered(RenderResult {
                content,
                has_framework,
                elapsed_ms,
            }))
        }
    }
}

fn run_session<S: Session>(
    session: &mut S,
    url: &str,
    options: &RenderOptions,
    deadline: Instant,
) -> Result<Finished> {
    let (sender, mut source) = signal::channel();
    session.register_signal_binding(sender)?;
    session.install_request_filter()?;
    session.install_instrumentation(&instrumentation_script(&options.profile, options.verbose))?;

    session.navigate(url, deadline)?;
    let raw = session.raw_body();

    let completion = match drive(&mut source, session, options, deadline)? {
        PipelineOutcome::TimedOut => return Ok(Finished::TimedOut),
        PipelineOutcome::Completed(completion) => completion,
    };

    let has_framework = completion.has_framework;
    if has_framework || options.render_non_framework_pages {
        return Ok(Finished::Rendered {
            content: session.content()?,
            has_framework,
        });
    }

    let content = match raw {
        Some(raw) => {
            info!("Headless detected no framework; returning raw page {}", url);
            raw
        }
        None => {
            warn!("No raw response captured for {}; returning the browser's DOM", url);
            session.content()?
        }
    };
    Ok(Finished::Rendered { content, has_framework })
}

/// Render `url` with headless Chrome, blocking the calling thread.
#[cfg(feature = "cdp")]
pub fn render_blocking(url: &str, options: &RenderOptions) -> Result<RenderOutcome> {
    render_with::<crate::cdp::CdpSession>(url, options)
}
