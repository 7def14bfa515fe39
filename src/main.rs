use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use hydrate_ssr::prerender::{self, DEFAULT_SUFFIX};
use hydrate_ssr::{RenderOptions, RenderOutcome};
use std::path::PathBuf;
use url::Url;

#[derive(Parser)]
#[command(name = "hydrate-ssr", version, about = "Server-side render data-binding pages with a headless browser")]
struct Cli {
    #[command(flatten)]
    render: RenderFlags,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RenderFlags {
    /// JSON file with render options (camelCase keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Mutation-free window after which a page counts as settled
    #[arg(long, global = true)]
    poll_timeout_ms: Option<u64>,

    /// Absolute ceiling on one render
    #[arg(long, global = true)]
    last_resort_timeout_ms: Option<u64>,

    /// Color components by rehydration phase
    #[arg(long, global = true)]
    color_debug: bool,

    /// Return the rendered DOM even for pages without the framework
    #[arg(long, global = true)]
    render_non_framework: bool,

    /// Forward page console output and log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render one URL
    Render {
        url: String,
        /// Write the markup to this file instead of stdout
        #[arg(short, long, conflicts_with = "out_dir")]
        out: Option<PathBuf>,
        /// Write the markup into this directory, named after the URL path
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Render every page template of a site served at BASE_URL
    Prerender {
        #[arg(long)]
        base_url: Url,
        /// Source tree (as served at BASE_URL)
        src: PathBuf,
        /// Output tree
        out: PathBuf,
        #[arg(long, default_value = DEFAULT_SUFFIX)]
        suffix: String,
    },
}

impl RenderFlags {
    fn options(&self) -> anyhow::Result<RenderOptions> {
        let mut options = match &self.config {
            Some(path) => RenderOptions::from_json_file(path)
                .with_context(|| format!("reading options from {}", path.display()))?,
            None => RenderOptions::default(),
        };
        if self.headed {
            options.headless = false;
        }
        if let Some(ms) = self.poll_timeout_ms {
            options.poll_timeout_ms = ms;
        }
        if let Some(ms) = self.last_resort_timeout_ms {
            options.last_resort_timeout_ms = ms;
        }
        options.color_debug |= self.color_debug;
        options.render_non_framework_pages |= self.render_non_framework;
        options.verbose |= self.verbose;
        options.validate()?;
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.render.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let options = cli.render.options()?;

    match cli.command {
        Command::Render { url, out, out_dir } => {
            let page = match hydrate_ssr::render(&url, &options).await? {
                RenderOutcome::Rendered(page) => page,
                RenderOutcome::TimedOut { elapsed_ms } => {
                    bail!("timed out rendering {} after {}ms", url, elapsed_ms)
                }
            };
            let target = match (out, out_dir) {
                (Some(file), _) => Some(file),
                (None, Some(dir)) => {
                    let path = Url::parse(&url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.clone());
                    Some(dir.join(prerender::file_name_for_url_path(&path)))
                }
                (None, None) => None,
            };
            match target {
                Some(path) => {
                    std::fs::write(&path, page.content.as_bytes())
                        .with_context(|| format!("writing {}", path.display()))?;
                    log::info!("Wrote {} ({})", path.display(), page.content_digest());
                }
                None => println!("{}", page.content),
            }
        }
        Command::Prerender { base_url, src, out, suffix } => {
            let pages = prerender::prerender_site(&base_url, &src, &out, &suffix, &options, |url, opts| async move {
                hydrate_ssr::render(&url, &opts).await
            })
            .await?;
            let with_framework = pages.iter().filter(|p| p.has_framework).count();
            log::info!(
                "Prerendered {} page(s) ({} with framework) into {}",
                pages.len(),
                with_framework,
                out.display()
            );
        }
    }
    Ok(())
}
