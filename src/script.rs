//! Page-side JavaScript generated by the renderer.
//!
//! Three kinds of script live here:
//! - the instrumentation installed on every new document of a render session,
//!   which forwards lifecycle signals to the host binding;
//! - the small snippets the host evaluates to embed the finished snapshot;
//! - the rehydration script embedded in the output for the next real client.
//!
//! Everything is produced from templates by substituting `{{TOKEN}}`
//! placeholders with JSON literals, so the output is plain text that can be
//! inspected and tested without a browser.

use crate::embed::Snapshot;
use serde::{Deserialize, Serialize};

/// Name of the binding the instrumentation reports through.
pub const SIGNAL_BINDING: &str = "__hydrateSsrSignal";

/// Global holding page-side render state (registry accessor, observer).
pub const STATE_GLOBAL: &str = "__hydrateSsr";

/// How the client framework exposes itself to the page.
///
/// The defaults describe Mavo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameworkProfile {
    /// Global object of the framework (`self[global]`)
    pub global: String,
    /// Property of the global holding live component instances
    pub registry: String,
    /// Hook fired once per component before data binding
    pub init_hook: String,
    /// Document event fired once all components exist
    pub app_loaded_event: String,
    /// JS expression awaited before component data notices are collected
    pub ready: String,
    /// Id of the template that carries pristine snapshots
    pub template_id: String,
    /// Class marking server-rendered component elements
    pub target_class: String,
    /// Class asking the framework not to hide elements while (re)loading
    pub no_hiding_class: String,
    /// Class added to the server-rendered element when a client adopts it
    pub init_class: String,
    /// Class added to the pristine element once it replaced the static one
    pub done_class: String,
}

impl Default for FrameworkProfile {
    fn default() -> Self {
        Self {
            global: "Mavo".to_string(),
            registry: "all".to_string(),
            init_hook: "init-start".to_string(),
            app_loaded_event: "mv-load".to_string(),
            ready: "Promise.all([self.Bliss && self.Bliss.ready ? self.Bliss.ready() : null, self.Mavo ? self.Mavo.inited : null])".to_string(),
            template_id: "mv-ssr-template".to_string(),
            target_class: "mv-ssr-target".to_string(),
            no_hiding_class: "mv-no-hiding-during-loading".to_string(),
            init_class: "mv-ssr-init".to_string(),
            done_class: "mv-ssr-done".to_string(),
        }
    }
}

fn js_str(s: &str) -> String {
    // serializing a &str cannot fail
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Debounce loop shared by every client-side settle pass: observe the
/// targets, push a single-shot timer back on each mutation batch, and call
/// `onStable` once the timer fires.
const SETTLE_JS: &str = r#"function (targets, delay, onStable) {
    var done = false;
    var timer = null;
    var observer = null;
    var fire = function () {
        if (done) return;
        done = true;
        observer.disconnect();
        onStable();
    };
    observer = new MutationObserver(function () {
        if (done) return;
        window.clearTimeout(timer);
        timer = window.setTimeout(fire, delay);
    });
    targets.forEach(function (target) {
        observer.observe(target, { attributes: true, childList: true, subtree: true });
    });
    timer = window.setTimeout(fire, delay);
    return observer;
}"#;

const INSTRUMENTATION_TEMPLATE: &str = r#"(function () {
    // new-document scripts also run in sub-frames; only the page itself reports
    if (window.top !== window) return;
    var send = function (msg) {
        try { window[{{BINDING}}](JSON.stringify(msg)); } catch (e) {}
    };
    var framework = function () { return self[{{GLOBAL}}]; };
    var registry = function () {
        var fw = framework();
        var all = (fw && fw[{{REGISTRY}}]) || {};
        if (Array.isArray(all)) return all.slice();
        if (all instanceof Set || all instanceof Map) return Array.from(all.values());
        return Object.keys(all).map(function (k) { return all[k]; });
    };
    var state = window[{{STATE}}] = { registry: registry, observer: null };
{{CONSOLE}}
    window.addEventListener("error", function (e) {
        send({ kind: "page-error", message: String(e && e.message) });
    });
    window.addEventListener("unhandledrejection", function (e) {
        send({ kind: "page-error", message: "Unhandled rejection: " + String(e && e.reason) });
    });
    document.addEventListener("DOMContentLoaded", function () {
        var fw = framework();
        if (!fw || !fw.hooks) {
            send({ kind: "no-framework" });
            return;
        }
        fw.hooks.add({{INIT_HOOK}}, function (app) {
            var clone = app.element.cloneNode(true);
            send({ kind: "init-start", id: String(app.id), markup: clone.outerHTML });
        });
    });
    var loaded = false;
    document.addEventListener({{APP_EVENT}}, function () {
        if (loaded) return;
        loaded = true;
        Promise.resolve().then(function () {
            return {{READY}};
        }).then(function () {
            var apps = registry();
            send({ kind: "app-loaded", ids: apps.map(function (a) { return String(a.id); }) });
            return Promise.all(apps.map(function (a) {
                return Promise.resolve(a.dataLoaded).then(function () {
                    send({ kind: "data-loaded", id: String(a.id), ok: true });
                }, function (e) {
                    send({ kind: "data-loaded", id: String(a.id), ok: false, error: String(e) });
                });
            }));
        }).then(function () {
            var observer = new MutationObserver(function (records) {
                send({ kind: "mutation", count: records.length });
            });
            registry().forEach(function (a) {
                observer.observe(a.element, { attributes: true, childList: true, subtree: true });
            });
            state.observer = observer;
        }, function (e) {
            send({ kind: "page-error", message: "Render instrumentation failed: " + String(e) });
        });
    });
})();"#;

const CONSOLE_FORWARD: &str = r#"    ["log", "info", "warn", "error", "debug"].forEach(function (level) {
        var orig = console[level];
        console[level] = function () {
            var args = Array.prototype.slice.call(arguments);
            send({ kind: "console", level: level, text: args.map(function (a) { return String(a); }).join(" ") });
            if (orig) orig.apply(console, args);
        };
    });"#;

/// Instrumentation installed on every new document of a render session.
///
/// With `forward_console` the page's console output is also reported.
pub fn instrumentation_script(profile: &FrameworkProfile, forward_console: bool) -> String {
    INSTRUMENTATION_TEMPLATE
        .replace("{{CONSOLE}}", if forward_console { CONSOLE_FORWARD } else { "" })
        .replace("{{BINDING}}", &js_str(SIGNAL_BINDING))
        .replace("{{STATE}}", &js_str(STATE_GLOBAL))
        .replace("{{GLOBAL}}", &js_str(&profile.global))
        .replace("{{REGISTRY}}", &js_str(&profile.registry))
        .replace("{{INIT_HOOK}}", &js_str(&profile.init_hook))
        .replace("{{APP_EVENT}}", &js_str(&profile.app_loaded_event))
        .replace("{{READY}}", &profile.ready)
}

const REHYDRATION_TEMPLATE: &str = r#"(function () {
    var settle = {{SETTLE}};
    var fw = self[{{GLOBAL}}];
    if (!fw || !fw.hooks) return;
    fw.hooks.add({{INIT_HOOK}}, function (app) {
        var template = document.getElementById({{TEMPLATE_ID}});
        if (!template) return;
        var pristine = template.content.getElementById(String(app.id));
        if (!pristine) return;
        app.element.classList.add({{INIT_CLASS}});
        app.ssrTarget = app.element;
        app.element = pristine;
        Promise.resolve(app.dataLoaded).then(function () {
            settle([pristine], {{DELAY}}, function () {
                pristine.classList.add({{DONE_CLASS}});
                app.ssrTarget.parentNode.replaceChild(pristine, app.ssrTarget);
            });
        }, function () {});
    });
})();"#;

/// Script a real client runs to adopt the server-rendered page.
///
/// For every initializing component with an embedded snapshot, the client
/// binds into the pristine copy while the static markup stays on screen, and
/// swaps the copy in once it stops mutating for `poll_timeout_ms`.
pub fn rehydration_script(profile: &FrameworkProfile, poll_timeout_ms: u64) -> String {
    REHYDRATION_TEMPLATE
        .replace("{{SETTLE}}", SETTLE_JS)
        .replace("{{GLOBAL}}", &js_str(&profile.global))
        .replace("{{INIT_HOOK}}", &js_str(&profile.init_hook))
        .replace("{{TEMPLATE_ID}}", &js_str(&profile.template_id))
        .replace("{{INIT_CLASS}}", &js_str(&profile.init_class))
        .replace("{{DONE_CLASS}}", &js_str(&profile.done_class))
        .replace("{{DELAY}}", &poll_timeout_ms.to_string())
}

/// Stylesheet coloring components by rehydration phase.
pub fn debug_stylesheet(profile: &FrameworkProfile) -> String {
    format!(
        ".{} * {{ color: red !important; }}\n.{} * {{ color: yellow !important; }}\n.{} * {{ color: green !important; }}\n",
        profile.target_class, profile.init_class, profile.done_class
    )
}

// --- Embedding snippets evaluated by the host ---

pub fn stop_observing_js() -> String {
    r#"(function (key) {
    var state = window[key];
    if (state && state.observer) {
        state.observer.disconnect();
        state.observer = null;
    }
    return true;
})({{STATE}})"#
        .replace("{{STATE}}", &js_str(STATE_GLOBAL))
}

/// Adds `classes` to every live component element; evaluates to a JSON array
/// of the tagged identities.
pub fn tag_components_js(classes: &[&str]) -> String {
    let classes = serde_json::to_string(classes).unwrap_or_else(|_| "[]".to_string());
    r#"(function (key, classes) {
    var state = window[key];
    var ids = [];
    (state ? state.registry() : []).forEach(function (app) {
        if (!app.element) return;
        classes.forEach(function (c) { app.element.classList.add(c); });
        ids.push(String(app.id));
    });
    return JSON.stringify(ids);
})({{STATE}}, {{CLASSES}})"#
        .replace("{{STATE}}", &js_str(STATE_GLOBAL))
        .replace("{{CLASSES}}", &classes)
}

/// Appends the snapshots to a new inert template in `<head>`; evaluates to
/// the number of snapshots embedded.
pub fn embed_snapshots_js(container_id: &str, snapshots: &[Snapshot]) -> String {
    let snapshots = serde_json::to_string(snapshots).unwrap_or_else(|_| "[]".to_string());
    r#"(function (containerId, snapshots) {
    var container = document.createElement("template");
    container.id = containerId;
    var count = 0;
    snapshots.forEach(function (snap) {
        var holder = document.createElement("template");
        holder.innerHTML = snap.markup;
        var node = holder.content.firstElementChild;
        if (!node) return;
        node.id = snap.id;
        container.content.appendChild(node);
        count++;
    });
    document.head.appendChild(container);
    return count;
})({{ID}}, {{SNAPSHOTS}})"#
        .replace("{{ID}}", &js_str(container_id))
        .replace("{{SNAPSHOTS}}", &snapshots)
}

pub fn inject_style_js(css: &str) -> String {
    r#"(function (css) {
    var el = document.createElement("style");
    el.textContent = css;
    document.head.appendChild(el);
    return true;
})({{CSS}})"#
        .replace("{{CSS}}", &js_str(css))
}

/// Appends an inline script to `<body>` without running it here.
///
/// A script inserted with a non-JavaScript type is never prepared; dropping
/// the type afterwards does not prepare it either, so the serialized markup
/// carries a plain `<script>` that only the next client executes.
pub fn inject_script_js(source: &str) -> String {
    r#"(function (source) {
    var el = document.createElement("script");
    el.type = "text/x-hydrate-ssr";
    el.text = source;
    document.body.appendChild(el);
    el.removeAttribute("type");
    return true;
})({{SOURCE}})"#
        .replace("{{SOURCE}}", &js_str(source))
}

/// Serializes the current document, doctype included.
pub const CONTENT_JS: &str = r#"(function () {
    var doctype = document.doctype ? new XMLSerializer().serializeToString(document.doctype) : "";
    return doctype + document.documentElement.outerHTML;
})()"#;
