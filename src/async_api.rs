use crate::render::render_with;
use crate::{Error, RenderOptions, RenderOutcome, Result, Session};
use std::thread;
use tokio::sync::oneshot;

/// Run one render on a dedicated worker thread and await its outcome.
///
/// The session is created, driven and torn down on the worker, so callers
/// never block an async executor thread and sessions never need to be
/// `Send`.
pub async fn render_on_worker<S: Session + 'static>(
    url: &str,
    options: &RenderOptions,
) -> Result<RenderOutcome> {
    let (tx, rx) = oneshot::channel();
    let url = url.to_string();
    let options = options.clone();

    thread::Builder::new()
        .name("hydrate-ssr-render".to_string())
        .spawn(move || {
            let res = render_with::<S>(&url, &options);
            let _ = tx.send(res);
        })
        .map_err(|e| Error::BrowserSession(format!("Failed to spawn render worker: {}", e)))?;

    rx.await
        .map_err(|e| Error::Other(format!("Render worker canceled: {}", e)))?
}

/// Render `url` with headless Chrome.
#[cfg(feature = "cdp")]
pub async fn render(url: &str, options: &RenderOptions) -> Result<RenderOutcome> {
    render_on_worker::<crate::cdp::CdpSession>(url, options).await
}
