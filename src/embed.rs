//! Snapshot embedding.
//!
//! Runs once when the page is declared quiescent. The steps happen in a
//! fixed order: stop observing, tag live components, embed the pristine
//! snapshots, optionally add the debug stylesheet, then inject the
//! rehydration script.

use crate::script::{debug_stylesheet, rehydration_script};
use crate::{RenderOptions, Result};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;

/// Pristine markup of one component, keyed by its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub markup: String,
}

/// Page operations the embedder needs.
pub trait PageSink {
    /// Disconnect the page-side mutation observer
    fn stop_observing(&mut self) -> Result<()>;

    /// Add `classes` to every live component element and return the
    /// identities that were tagged
    fn tag_components(&mut self, classes: &[&str]) -> Result<Vec<String>>;

    /// Append the snapshots to one inert container with id `container_id`;
    /// returns how many were embedded
    fn embed_snapshots(&mut self, container_id: &str, snapshots: &[Snapshot]) -> Result<usize>;

    /// Append a stylesheet to the document head
    fn inject_style(&mut self, css: &str) -> Result<()>;

    /// Append an inline script to the body without executing it
    fn inject_script(&mut self, source: &str) -> Result<()>;
}

/// Completion report handed back to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub has_framework: bool,
    pub embedded: usize,
}

impl Completion {
    pub fn framework_absent() -> Self {
        Self {
            has_framework: false,
            embedded: 0,
        }
    }
}

/// Keep only snapshots of tagged components, at most one per identity, so
/// every embedded snapshot has exactly one live counterpart.
pub fn select_snapshots(snapshots: Vec<Snapshot>, live_ids: &[String]) -> Vec<Snapshot> {
    let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(snapshots.len());
    for snap in snapshots {
        if !live.contains(snap.id.as_str()) {
            warn!("Dropping snapshot for component {} which is no longer live", snap.id);
            continue;
        }
        if seen.insert(snap.id.clone()) {
            selected.push(snap);
        }
    }
    for id in live_ids.iter().filter(|id| !seen.contains(*id)) {
        debug!("Component {} has no pristine snapshot; it will render client-side", id);
    }
    selected
}

/// Embed snapshots and the rehydration script into the settled page.
pub fn embed<K: PageSink + ?Sized>(
    sink: &mut K,
    snapshots: Vec<Snapshot>,
    options: &RenderOptions,
) -> Result<Completion> {
    let profile = &options.profile;

    sink.stop_observing()?;

    let live = sink.tag_components(&[profile.target_class.as_str(), profile.no_hiding_class.as_str()])?;

    let selected = select_snapshots(snapshots, &live);
    let embedded = sink.embed_snapshots(&profile.template_id, &selected)?;

    if options.color_debug {
        sink.inject_style(&debug_stylesheet(profile))?;
    }

    sink.inject_script(&rehydration_script(profile, options.poll_timeout_ms))?;

    debug!("Embedded {} snapshot(s) for {} live component(s)", embedded, live.len());
    Ok(Completion {
        has_framework: true,
        embedded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        live: Vec<String>,
        calls: Vec<String>,
        embedded: Vec<Snapshot>,
    }

    impl PageSink for Recorder {
        fn stop_observing(&mut self) -> Result<()> {
            self.calls.push("stop".into());
            Ok(())
        }

        fn tag_components(&mut self, classes: &[&str]) -> Result<Vec<String>> {
            self.calls.push(format!("tag {}", classes.join(" ")));
            Ok(self.live.clone())
        }

        fn embed_snapshots(&mut self, container_id: &str, snapshots: &[Snapshot]) -> Result<usize> {
            self.calls.push(format!("embed {}", container_id));
            self.embedded = snapshots.to_vec();
            Ok(snapshots.len())
        }

        fn inject_style(&mut self, _css: &str) -> Result<()> {
            self.calls.push("style".into());
            Ok(())
        }

        fn inject_script(&mut self, _source: &str) -> Result<()> {
            self.calls.push("script".into());
            Ok(())
        }
    }

    fn snap(id: &str) -> Snapshot {
        Snapshot { id: id.into(), markup: format!("<div>{}</div>", id) }
    }

    #[test]
    fn steps_run_in_order() {
        let mut sink = Recorder { live: vec!["cart".into()], ..Default::default() };
        let options = RenderOptions { color_debug: true, ..Default::default() };
        let done = embed(&mut sink, vec![snap("cart")], &options).unwrap();
        assert_eq!(
            sink.calls,
            vec![
                "stop",
                "tag mv-ssr-target mv-no-hiding-during-loading",
                "embed mv-ssr-template",
                "style",
                "script"
            ]
        );
        assert_eq!(done, Completion { has_framework: true, embedded: 1 });
    }

    #[test]
    fn style_is_opt_in() {
        let mut sink = Recorder::default();
        embed(&mut sink, vec![], &RenderOptions::default()).unwrap();
        assert!(!sink.calls.iter().any(|c| c == "style"));
    }

    #[test]
    fn only_live_components_are_embedded() {
        let mut sink = Recorder { live: vec!["cart".into(), "profile".into()], ..Default::default() };
        let done = embed(&mut sink, vec![snap("gone"), snap("profile"), snap("cart")], &RenderOptions::default()).unwrap();
        let ids: Vec<_> = sink.embedded.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["profile", "cart"]);
        assert_eq!(done.embedded, 2);
    }

    #[test]
    fn duplicate_snapshots_are_collapsed() {
        let picked = select_snapshots(vec![snap("a"), snap("a")], &["a".to_string()]);
        assert_eq!(picked.len(), 1);
    }
}
