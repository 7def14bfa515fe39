//! Static-site prerendering with a stand-in renderer

use hydrate_ssr::prerender::{prerender_site, DEFAULT_SUFFIX};
use hydrate_ssr::{Error, RenderOptions, RenderOutcome, RenderResult};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use url::Url;

fn site() -> TempDir {
    let src = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("blog")).unwrap();
    fs::write(src.path().join("index.tpl.html"), "<div mv-app=\"home\"></div>").unwrap();
    fs::write(src.path().join("blog/post.tpl.html"), "<div mv-app=\"post\"></div>").unwrap();
    fs::write(src.path().join("blog/style.css"), "body { color: black }").unwrap();
    fs::write(src.path().join("data.json"), "{}").unwrap();
    src
}

fn rendered(url: &str) -> RenderOutcome {
    RenderOutcome::Rendered(RenderResult {
        content: format!("<html><body>rendered {}</body></html>", url),
        has_framework: !url.ends_with("index.tpl.html"),
        elapsed_ms: 7,
    })
}

#[tokio::test]
async fn templates_are_rendered_and_assets_copied() {
    let src = site();
    let out = TempDir::new().unwrap();
    let base = Url::parse("http://localhost:8000/").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    let pages = prerender_site(&base, src.path(), out.path(), DEFAULT_SUFFIX, &RenderOptions::default(), move |url, _| {
        log.lock().unwrap().push(url.clone());
        async move { Ok(rendered(&url)) }
    })
    .await
    .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "http://localhost:8000/blog/post.tpl.html".to_string(),
            "http://localhost:8000/index.tpl.html".to_string(),
        ]
    );
    assert_eq!(pages.len(), 2);
    assert!(pages[0].has_framework);
    assert!(!pages[1].has_framework);
    assert_eq!(pages[0].digest.len(), 64);

    let post = fs::read_to_string(out.path().join("blog/post.html")).unwrap();
    assert_eq!(post, "<html><body>rendered http://localhost:8000/blog/post.tpl.html</body></html>");
    assert!(out.path().join("index.html").exists());
    assert!(!out.path().join("index.tpl.html").exists());
    assert_eq!(fs::read_to_string(out.path().join("blog/style.css")).unwrap(), "body { color: black }");
    assert!(out.path().join("data.json").exists());
}

#[tokio::test]
async fn timeout_aborts_the_run() {
    let src = site();
    let out = TempDir::new().unwrap();
    let base = Url::parse("http://localhost:8000/").unwrap();

    let err = prerender_site(&base, src.path(), out.path(), DEFAULT_SUFFIX, &RenderOptions::default(), |_, _| async {
        Ok(RenderOutcome::TimedOut { elapsed_ms: 30000 })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::RenderTimeout(30000)));
    assert!(!out.path().join("blog/post.html").exists());
}

#[tokio::test]
async fn render_options_are_passed_through() {
    let src = site();
    let out = TempDir::new().unwrap();
    let base = Url::parse("http://localhost:8000/site/").unwrap();
    let options = RenderOptions {
        poll_timeout_ms: 900,
        ..Default::default()
    };

    let pages = prerender_site(&base, src.path(), out.path(), DEFAULT_SUFFIX, &options, |url, opts| async move {
        assert_eq!(opts.poll_timeout_ms, 900);
        Ok(rendered(&url))
    })
    .await
    .unwrap();

    assert_eq!(pages[1].url, "http://localhost:8000/site/index.tpl.html");
}
