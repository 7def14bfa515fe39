//! Static-site prerendering.
//!
//! Walks a source tree served at some base URL, renders every page template
//! (files ending in a suffix such as `.tpl.html`) and writes the result next
//! to the copied remaining files in an output tree. Serving the source tree
//! is up to the caller.

use crate::{Error, RenderOptions, RenderOutcome, RenderResult, Result};
use log::info;
use std::future::Future;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

/// Default suffix marking page templates.
pub const DEFAULT_SUFFIX: &str = ".tpl.html";

/// One rendered template.
#[derive(Debug, Clone)]
pub struct PrerenderedPage {
    pub source: PathBuf,
    pub output: PathBuf,
    pub url: String,
    pub has_framework: bool,
    pub elapsed_ms: u64,
    pub digest: String,
}

/// File name for a rendered URL path: every character outside
/// `[-_.a-zA-Z0-9]` becomes `_`.
pub fn file_name_for(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name for the page at URL path `path`; directory paths such as `/`
/// or `/blog/` name their index page.
pub fn file_name_for_url_path(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        file_name_for(&format!("{}index.html", path))
    } else {
        file_name_for(path)
    }
}

/// Output path for a template: the suffix is replaced by `.html`.
pub fn output_path_for(relative: &Path, suffix: &str) -> Option<PathBuf> {
    let name = relative.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    Some(relative.with_file_name(format!("{}.html", stem)))
}

/// URL a template is served at below `base`.
pub fn url_for(base: &Url, relative: &Path) -> Result<Url> {
    let rel = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    base.join(&rel)
        .map_err(|e| Error::Config(format!("Cannot resolve {} against {}: {}", rel, base, e)))
}

/// Prerender every template below `src` into `out` using `render`.
///
/// Templates are rendered one at a time, each in its own session; the first
/// timeout or hard failure aborts the run.
pub async fn prerender_site<F, Fut>(
    base: &Url,
    src: &Path,
    out: &Path,
    suffix: &str,
    options: &RenderOptions,
    render: F,
) -> Result<Vec<PrerenderedPage>>
where
    F: Fn(String, RenderOptions) -> Fut,
    Fut: Future<Output = Result<RenderOutcome>>,
{
    let mut pages = Vec::new();

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Other(e.to_string()))?
            .to_path_buf();

        let Some(output_rel) = output_path_for(&relative, suffix) else {
            let target = out.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(entry.path(), &target).await?;
            continue;
        };

        let url = url_for(base, &relative)?;
        let result: RenderResult = render(url.to_string(), options.clone()).await?.into_result()?;

        let target = out.join(&output_rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, result.content.as_bytes()).await?;
        info!("Prerendered {} -> {} in {}ms", url, target.display(), result.elapsed_ms);

        pages.push(PrerenderedPage {
            source: entry.path().to_path_buf(),
            output: target,
            url: url.to_string(),
            has_framework: result.has_framework,
            elapsed_ms: result.elapsed_ms,
            digest: result.content_digest(),
        });
    }

    Ok(pages)
}
