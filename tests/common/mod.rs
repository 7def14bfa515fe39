//! Shared fakes for pipeline and orchestrator tests
#![allow(dead_code)]

use hydrate_ssr::script::SIGNAL_BINDING;
use hydrate_ssr::signal::PageSignal;
use hydrate_ssr::{Error, PageSink, RenderOptions, Result, Session, SignalSender, Snapshot};
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Records every embedder call and serves a fixed set of live components.
#[derive(Default)]
pub struct RecordingSink {
    pub live: Vec<String>,
    pub calls: Vec<String>,
    pub snapshots: Vec<Snapshot>,
    pub script: Option<String>,
    pub style: Option<String>,
}

impl RecordingSink {
    pub fn with_live(ids: &[&str]) -> Self {
        Self {
            live: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// A rough rendering of what the page would serialize to.
    pub fn markup(&self) -> String {
        let mut out = String::from("<!DOCTYPE html><html><head>");
        if !self.snapshots.is_empty() {
            out.push_str("<template id=\"mv-ssr-template\">");
            for snap in &self.snapshots {
                out.push_str(&format!("<!--{}-->{}", snap.id, snap.markup));
            }
            out.push_str("</template>");
        }
        if let Some(css) = &self.style {
            out.push_str(&format!("<style>{}</style>", css));
        }
        out.push_str("</head><body>");
        for id in &self.live {
            out.push_str(&format!("<div mv-app=\"{}\" class=\"mv-ssr-target\">rendered</div>", id));
        }
        if let Some(js) = &self.script {
            out.push_str(&format!("<script>{}</script>", js));
        }
        out.push_str("</body></html>");
        out
    }
}

impl PageSink for RecordingSink {
    fn stop_observing(&mut self) -> Result<()> {
        self.calls.push("stop-observing".into());
        Ok(())
    }

    fn tag_components(&mut self, classes: &[&str]) -> Result<Vec<String>> {
        self.calls.push(format!("tag {}", classes.join(" ")));
        Ok(self.live.clone())
    }

    fn embed_snapshots(&mut self, container_id: &str, snapshots: &[Snapshot]) -> Result<usize> {
        self.calls.push(format!("embed {}", container_id));
        self.snapshots = snapshots.to_vec();
        Ok(snapshots.len())
    }

    fn inject_style(&mut self, css: &str) -> Result<()> {
        self.calls.push("style".into());
        self.style = Some(css.to_string());
        Ok(())
    }

    fn inject_script(&mut self, source: &str) -> Result<()> {
        self.calls.push("script".into());
        self.script = Some(source.to_string());
        Ok(())
    }
}

/// What a fake page does once navigated.
#[derive(Clone, Default)]
pub struct Plan {
    /// Signals emitted `ms` after navigation
    pub signals: Vec<(u64, PageSignal)>,
    /// Keep mutating every 10ms after the scripted signals
    pub endless_mutations: bool,
    /// The page target dies this many ms after navigation
    pub crash_at: Option<u64>,
    pub live: Vec<String>,
    pub raw: Option<String>,
    pub fail_launch: bool,
    pub fail_navigation: bool,
}

/// A page scenario with its own journal of session calls.
pub trait Scenario: 'static {
    fn plan() -> Plan;
    fn journal() -> &'static Mutex<Vec<String>>;

    fn entries() -> Vec<String> {
        Self::journal().lock().map(|j| j.clone()).unwrap_or_default()
    }
}

#[macro_export]
macro_rules! scenario {
    ($name:ident, $plan:expr) => {
        struct $name;
        impl $crate::common::Scenario for $name {
            fn plan() -> $crate::common::Plan {
                $plan
            }
            fn journal() -> &'static std::sync::Mutex<Vec<String>> {
                static JOURNAL: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());
                &JOURNAL
            }
        }
    };
}

/// Session double driven by a [`Scenario`].
pub struct FakeSession<S: Scenario> {
    plan: Plan,
    sender: Option<SignalSender>,
    instrumented: bool,
    sink: RecordingSink,
    _scenario: PhantomData<S>,
}

impl<S: Scenario> FakeSession<S> {
    fn note(&self, entry: &str) {
        if let Ok(mut j) = S::journal().lock() {
            j.push(entry.to_string());
        }
    }
}

impl<S: Scenario> PageSink for FakeSession<S> {
    fn stop_observing(&mut self) -> Result<()> {
        self.note("stop-observing");
        self.sink.stop_observing()
    }

    fn tag_components(&mut self, classes: &[&str]) -> Result<Vec<String>> {
        self.note("tag");
        self.sink.tag_components(classes)
    }

    fn embed_snapshots(&mut self, container_id: &str, snapshots: &[Snapshot]) -> Result<usize> {
        self.note("embed");
        self.sink.embed_snapshots(container_id, snapshots)
    }

    fn inject_style(&mut self, css: &str) -> Result<()> {
        self.note("style");
        self.sink.inject_style(css)
    }

    fn inject_script(&mut self, source: &str) -> Result<()> {
        self.note("script");
        self.sink.inject_script(source)
    }
}

impl<S: Scenario> Session for FakeSession<S> {
    fn launch(_options: &RenderOptions) -> Result<Self> {
        let plan = S::plan();
        if plan.fail_launch {
            return Err(Error::BrowserSession("browser binary not found".into()));
        }
        let session = Self {
            sink: RecordingSink {
                live: plan.live.clone(),
                ..Default::default()
            },
            plan,
            sender: None,
            instrumented: false,
            _scenario: PhantomData,
        };
        session.note("launch");
        Ok(session)
    }

    fn register_signal_binding(&mut self, sender: SignalSender) -> Result<()> {
        self.note("binding");
        self.sender = Some(sender);
        Ok(())
    }

    fn install_request_filter(&mut self) -> Result<()> {
        self.note("filter");
        Ok(())
    }

    fn install_instrumentation(&mut self, source: &str) -> Result<()> {
        self.note("instrumentation");
        if self.sender.is_none() || !source.contains(SIGNAL_BINDING) {
            return Err(Error::Script("instrumentation installed before its binding".into()));
        }
        self.instrumented = true;
        Ok(())
    }

    fn navigate(&mut self, _url: &str, _deadline: Instant) -> Result<()> {
        self.note("navigate");
        if !self.instrumented {
            return Err(Error::Script("navigated before instrumentation".into()));
        }
        if self.plan.fail_navigation {
            return Err(Error::Navigation("net::ERR_CONNECTION_REFUSED".into()));
        }
        let Some(sender) = self.sender.clone() else {
            return Err(Error::Script("no binding".into()));
        };
        let signals = self.plan.signals.clone();
        let endless = self.plan.endless_mutations;
        let crash_at = self.plan.crash_at;
        std::thread::spawn(move || {
            let start = Instant::now();
            for (offset, signal) in signals {
                let due = start + Duration::from_millis(offset);
                std::thread::sleep(due.saturating_duration_since(Instant::now()));
                if !sender.send(signal) {
                    return;
                }
            }
            if let Some(offset) = crash_at {
                let due = start + Duration::from_millis(offset);
                std::thread::sleep(due.saturating_duration_since(Instant::now()));
                // the session keeps its own sender, so only this notice ends the wait
                sender.session_lost("renderer crashed");
                return;
            }
            while endless {
                std::thread::sleep(Duration::from_millis(10));
                if !sender.send(PageSignal::Mutation { count: 1 }) {
                    return;
                }
            }
        });
        Ok(())
    }

    fn raw_body(&self) -> Option<String> {
        self.plan.raw.clone()
    }

    fn content(&mut self) -> Result<String> {
        self.note("content");
        Ok(self.sink.markup())
    }

    fn close(self) -> Result<()> {
        self.note("close");
        Ok(())
    }
}

pub fn init(id: &str, markup: &str) -> PageSignal {
    PageSignal::InitStart {
        id: id.into(),
        markup: markup.into(),
    }
}

pub fn app_loaded(ids: &[&str]) -> PageSignal {
    PageSignal::AppLoaded {
        ids: ids.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn data_loaded(id: &str) -> PageSignal {
    PageSignal::DataLoaded {
        id: id.into(),
        ok: true,
        error: None,
    }
}

pub fn data_failed(id: &str, error: &str) -> PageSignal {
    PageSignal::DataLoaded {
        id: id.into(),
        ok: false,
        error: Some(error.into()),
    }
}
