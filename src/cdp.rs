//! Chrome DevTools Protocol session implementation

use crate::embed::{PageSink, Snapshot};
use crate::filter::{self, RequestAction, ResourceCategory};
use crate::quiesce::{Debouncer, Phase};
use crate::script::{self, SIGNAL_BINDING};
use crate::signal::{decode_binding_payload, SignalSender};
use crate::{Error, RenderOptions, Result, Session};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::Network::{ErrorReason, GetResponseBodyReturnObject};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Inspector, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const NETWORK_POLL: Duration = Duration::from_millis(25);

/// Headless Chrome session for a single render (uses the `headless_chrome` crate)
///
/// Launches its own browser process with one tab. Nothing is shared with
/// other sessions; dropping or closing the session ends the process.
pub struct CdpSession {
    browser: Browser,
    tab: Arc<Tab>,
    options: RenderOptions,

    network: Arc<Mutex<NetworkActivity>>,
    raw_body: Arc<Mutex<Option<String>>>,
}

/// Requests in flight on the tab, fed from network events.
#[derive(Debug, Default)]
struct NetworkActivity {
    in_flight: HashSet<String>,
    // bumped on every start or finish, so the idle timer sees any change
    changes: u64,
}

impl NetworkActivity {
    fn started(&mut self, request_id: &str) {
        self.in_flight.insert(request_id.to_string());
        self.changes += 1;
    }

    fn finished(&mut self, request_id: &str) {
        if self.in_flight.remove(request_id) {
            self.changes += 1;
        }
    }
}

impl CdpSession {
    fn eval(&self, js: &str) -> Result<Option<serde_json::Value>> {
        self.tab
            .evaluate(js, false)
            .map(|remote| remote.value)
            .map_err(|e| Error::Script(format!("Evaluation failed: {}", e)))
    }

    /// Feed network activity into the idle tracker and report a crashed or
    /// detached target to the pipeline through `sender`.
    fn watch_tab_events(&self, sender: SignalSender) -> Result<()> {
        let network = Arc::clone(&self.network);
        self.tab
            .add_event_listener(Arc::new(move |event: &Event| match event {
                Event::InspectorTargetCrashed(_) => {
                    let _ = sender.session_lost("renderer crashed");
                }
                Event::InspectorDetached(_) => {
                    let _ = sender.session_lost("inspector detached");
                }
                Event::NetworkRequestWillBeSent(e) => {
                    if let Ok(mut n) = network.lock() {
                        n.started(&e.params.request_id);
                    }
                }
                Event::NetworkLoadingFinished(e) => {
                    if let Ok(mut n) = network.lock() {
                        n.finished(&e.params.request_id);
                    }
                }
                Event::NetworkLoadingFailed(e) => {
                    if let Ok(mut n) = network.lock() {
                        n.finished(&e.params.request_id);
                    }
                }
                _ => {}
            }))
            .map_err(|e| Error::BrowserSession(format!("Failed to watch tab events: {}", e)))?;
        self.tab
            .call_method(Inspector::Enable(None))
            .map_err(|e| Error::BrowserSession(format!("Failed to enable inspector events: {}", e)))?;
        Ok(())
    }

    fn network_snapshot(&self) -> (u64, usize) {
        self.network
            .lock()
            .map(|n| (n.changes, n.in_flight.len()))
            .unwrap_or((0, 0))
    }

    /// Block until no request was in flight and none started or finished
    /// for `network_idle_ms`. Returns `false` if `deadline` came first.
    fn wait_for_network_idle(&self, deadline: Instant) -> bool {
        let mut idle = Debouncer::new(self.options.network_idle());
        let (mut seen, _) = self.network_snapshot();
        idle.start(Instant::now());

        loop {
            let now = Instant::now();
            let (changes, in_flight) = self.network_snapshot();
            // an open request keeps pushing the idle timer back
            if changes != seen || in_flight > 0 {
                seen = changes;
                idle.on_activity(now);
            }
            if idle.poll(now) == Phase::Stable {
                debug!("Network idle after {} request event(s)", seen);
                return true;
            }
            if now >= deadline {
                return false;
            }
            let nap = idle
                .remaining(now)
                .unwrap_or(NETWORK_POLL)
                .min(deadline.saturating_duration_since(now))
                .min(NETWORK_POLL);
            std::thread::sleep(nap);
        }
    }
}

fn decode_body(body: GetResponseBodyReturnObject) -> Option<String> {
    if !body.base_64_encoded {
        return Some(body.body);
    }
    match base64::engine::general_purpose::STANDARD.decode(body.body.as_bytes()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!("Failed to decode document body: {}", e);
            None
        }
    }
}

impl Session for CdpSession {
    fn launch(options: &RenderOptions) -> Result<Self>
    where
        Self: Sized,
    {
        let launch_options = LaunchOptions::default_builder()
            .headless(options.headless)
            .window_size(Some((options.viewport.width, options.viewport.height)))
            .idle_browser_timeout(options.last_resort_timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| Error::BrowserSession(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::BrowserSession(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::BrowserSession(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(options.last_resort_timeout());

        Ok(Self {
            browser,
            tab,
            options: options.clone(),
            network: Arc::new(Mutex::new(NetworkActivity::default())),
            raw_body: Arc::new(Mutex::new(None)),
        })
    }

    fn register_signal_binding(&mut self, sender: SignalSender) -> Result<()> {
        self.watch_tab_events(sender.clone())?;
        self.tab
            .expose_function(
                SIGNAL_BINDING,
                Arc::new(move |payload: serde_json::Value| match decode_binding_payload(payload) {
                    Some(signal) => {
                        let _ = sender.send(signal);
                    }
                    None => warn!("Ignoring malformed page signal"),
                }),
            )
            .map_err(|e| Error::BrowserSession(format!("Failed to expose signal binding: {}", e)))
    }

    fn install_request_filter(&mut self) -> Result<()> {
        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport, _session_id, event: RequestPausedEvent| {
                let category = ResourceCategory::from_cdp_name(&format!("{:?}", event.params.resource_Type));
                match filter::decide(category) {
                    RequestAction::Continue => RequestPausedDecision::Continue(None),
                    RequestAction::Abort => RequestPausedDecision::Fail(FailRequest {
                        request_id: event.params.request_id.clone(),
                        error_reason: ErrorReason::BlockedByClient,
                    }),
                }
            },
        );

        self.tab
            .enable_fetch(None, Some(false))
            .map_err(|e| Error::BrowserSession(format!("Failed to enable fetch domain: {}", e)))?;
        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| Error::BrowserSession(format!("Failed to enable request interception: {}", e)))?;
        Ok(())
    }

    fn install_instrumentation(&mut self, source: &str) -> Result<()> {
        self.tab
            .call_method(Page::AddScriptToEvaluateOnNewDocument {
                source: source.to_string(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            })
            .map_err(|e| Error::BrowserSession(format!("Failed to install instrumentation: {}", e)))?;
        Ok(())
    }

    fn navigate(&mut self, url: &str, deadline: Instant) -> Result<()> {
        // keep the first HTML document response as the raw fallback
        let raw = Arc::clone(&self.raw_body);
        self.tab
            .register_response_handling(
                "hydrate-ssr-document",
                Box::new(
                    move |params, fetch_body| {
                        if !params.response.mime_type.contains("html") {
                            return;
                        }
                        let Ok(mut slot) = raw.lock() else {
                            return;
                        };
                        if slot.is_some() {
                            return;
                        }
                        match fetch_body() {
                            Ok(body) => *slot = decode_body(body),
                            Err(e) => warn!("Failed to read document body of {}: {}", params.response.url, e),
                        }
                    },
                ),
            )
            .map_err(|e| Error::BrowserSession(format!("Failed to watch responses: {}", e)))?;

        self.tab
            .navigate_to(url)
            .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;

        if !self.wait_for_network_idle(deadline) {
            debug!("Network still busy at the render deadline for {}", url);
        }
        Ok(())
    }

    fn raw_body(&self) -> Option<String> {
        self.raw_body.lock().ok().and_then(|slot| slot.clone())
    }

    fn content(&mut self) -> Result<String> {
        match self.eval(script::CONTENT_JS)? {
            Some(serde_json::Value::String(html)) => Ok(html),
            other => Err(Error::Script(format!("Unexpected document serialization: {:?}", other))),
        }
    }

    fn close(self) -> Result<()> {
        // Drop the tab before the browser so the child process exits promptly.
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

impl PageSink for CdpSession {
    fn stop_observing(&mut self) -> Result<()> {
        self.eval(&script::stop_observing_js())?;
        Ok(())
    }

    fn tag_components(&mut self, classes: &[&str]) -> Result<Vec<String>> {
        match self.eval(&script::tag_components_js(classes))? {
            Some(serde_json::Value::String(ids)) => Ok(serde_json::from_str(&ids)
                .map_err(|e| Error::Script(format!("Bad component id list: {}", e)))?),
            other => Err(Error::Script(format!("Unexpected tagging result: {:?}", other))),
        }
    }

    fn embed_snapshots(&mut self, container_id: &str, snapshots: &[Snapshot]) -> Result<usize> {
        let count = self
            .eval(&script::embed_snapshots_js(container_id, snapshots))?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn inject_style(&mut self, css: &str) -> Result<()> {
        self.eval(&script::inject_style_js(css))?;
        Ok(())
    }

    fn inject_script(&mut self, source: &str) -> Result<()> {
        self.eval(&script::inject_script_js(source))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_session_launch() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        match CdpSession::launch(&RenderOptions::default()) {
            Ok(session) => assert!(session.close().is_ok()),
            Err(e) => eprintln!("Skipping CDP session test because Chrome is not available or failed to launch: {}", e),
        }
    }

    #[test]
    fn redirects_and_unknown_ids_keep_the_count_balanced() {
        let mut net = NetworkActivity::default();
        net.started("1");
        net.started("1"); // redirect hop reuses the id
        net.started("2");
        net.finished("1");
        net.finished("9");
        assert_eq!(net.in_flight.len(), 1);
        assert_eq!(net.changes, 4);
        net.finished("2");
        assert!(net.in_flight.is_empty());
    }

    #[test]
    fn plain_bodies_pass_through() {
        let body = GetResponseBodyReturnObject { body: "<html></html>".into(), base_64_encoded: false };
        assert_eq!(decode_body(body).as_deref(), Some("<html></html>"));
    }

    #[test]
    fn base64_bodies_are_decoded() {
        let body = GetResponseBodyReturnObject { body: "PHA+aGk8L3A+".into(), base_64_encoded: true };
        assert_eq!(decode_body(body).as_deref(), Some("<p>hi</p>"));
    }
}
