mod surface;

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use wikipreview_core::client::{MediaWikiClient, MediaWikiClientConfig, WikiApi};
use wikipreview_core::config::{DEFAULT_CONFIG_PATH, WikiConfig, load_config};
use wikipreview_core::error::PreviewError;
use wikipreview_core::preview::{PreviewContext, PreviewSettings, PreviewStatus};

use crate::surface::{FileSurfaceHost, OutputTarget};

const DEFAULT_SUMMARY: &str = "Edited with wikipreview";

#[derive(Debug, Parser)]
#[command(
    name = "wikipreview",
    version,
    about = "Preview wikitext through a MediaWiki parse API and exchange pages with the wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved configuration diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Render a local wikitext file into an HTML preview")]
    Preview(PreviewArgs),
    #[command(about = "Render a wiki page into a new HTML file")]
    View(ViewArgs),
    #[command(about = "Fetch the wikitext source of a page")]
    Pull(PullArgs),
    #[command(about = "Save a local file as a new revision of a page")]
    Push(PushArgs),
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    file: PathBuf,
    #[arg(long, value_name = "PATH", help = "Output HTML file (default: <file>.preview.html)")]
    out: Option<PathBuf>,
    #[arg(long, help = "Re-render when the file changes; delete the output to stop")]
    watch: bool,
    #[arg(long, value_name = "MS", default_value_t = 500)]
    interval_ms: u64,
}

#[derive(Debug, Args)]
struct ViewArgs {
    title: String,
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Debug, Args)]
struct PullArgs {
    title: String,
    #[arg(long, value_name = "PATH", help = "Write to a file instead of stdout")]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PushArgs {
    file: PathBuf,
    #[arg(long, help = "Page title (default: file name without extension)")]
    title: Option<String>,
    #[arg(long, short = 'm', default_value = DEFAULT_SUMMARY)]
    summary: String,
}

type CliContext = PreviewContext<MediaWikiClient, FileSurfaceHost>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let config = load_runtime_config(&cli)?;
    if cli.diagnostics {
        print_diagnostics(&cli, &config);
    }

    match cli.command {
        Some(Commands::Preview(args)) => run_preview(&config, args),
        Some(Commands::View(args)) => run_view(&config, args),
        Some(Commands::Pull(args)) => run_pull(&config, args),
        Some(Commands::Push(args)) => run_push(&config, args),
        Some(Commands::Config) => run_config(&config),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to install tracing subscriber: {error}"))
}

fn load_runtime_config(cli: &Cli) -> Result<WikiConfig> {
    dotenvy::dotenv().ok();
    let path = config_path(cli);
    load_config(&path)
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// None when no wiki host is configured; callers treat that as a no-op.
fn build_context(config: &WikiConfig, target: OutputTarget) -> Result<Option<CliContext>> {
    let (Some(settings), Some(client_config)) = (
        PreviewSettings::from_config(config),
        MediaWikiClientConfig::from_config(config),
    ) else {
        debug!("no wiki host configured (set [wiki].host or WIKI_HOST)");
        return Ok(None);
    };
    let client = MediaWikiClient::new(client_config)?;
    Ok(Some(PreviewContext::new(
        client,
        FileSurfaceHost::new(target),
        settings,
        config.credentials(),
    )))
}

fn run_preview(config: &WikiConfig, args: PreviewArgs) -> Result<()> {
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| default_preview_path(&args.file));
    let Some(mut context) = build_context(config, OutputTarget::File(out.clone()))? else {
        return Ok(());
    };

    let text = read_document(&args.file)?;
    let status = context.preview_document(&text)?;
    report_status(&status, &out, !args.watch)?;
    if !args.watch {
        return Ok(());
    }

    let mut last_modified = modified_at(&args.file)?;
    let mut had_session = context.panels().live_session().is_some();
    println!("watching: {}", normalize_path(&args.file));
    loop {
        sleep(Duration::from_millis(args.interval_ms.max(50)));
        if context.panels_mut().host_mut().sweep_closed() > 0 {
            context.panels_mut().on_session_closed_by_user();
        }
        if had_session && context.panels().live_session().is_none() {
            println!("preview closed: {}", normalize_path(&out));
            return Ok(());
        }

        let modified = modified_at(&args.file)?;
        if modified == last_modified {
            continue;
        }
        last_modified = modified;
        let text = read_document(&args.file)?;
        let status = context.preview_document(&text)?;
        report_status(&status, &out, false)?;
        had_session |= context.panels().live_session().is_some();
    }
}

fn run_view(config: &WikiConfig, args: ViewArgs) -> Result<()> {
    let Some(mut context) = build_context(config, OutputTarget::Directory(args.out_dir))? else {
        return Ok(());
    };
    let Some(view) = context.view_page(&args.title)? else {
        return Ok(());
    };
    report_status(&view.status, view.session.surface().path(), true)
}

fn run_pull(config: &WikiConfig, args: PullArgs) -> Result<()> {
    let Some(mut context) = build_context(config, OutputTarget::Directory(PathBuf::from(".")))?
    else {
        return Ok(());
    };
    let page = match context.fetch_source(&args.title) {
        Ok(Some(page)) => page,
        Ok(None) => return Ok(()),
        Err(error) => return report_soft_failure(error),
    };

    match args.out {
        Some(path) => {
            fs::write(&path, &page.content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("pulled: {}", page.title);
            println!("output: {}", normalize_path(&path));
            println!(
                "revision: {}",
                page.revision_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
            println!("timestamp: {}", page.timestamp.as_deref().unwrap_or("n/a"));
        }
        None => print!("{}", page.content),
    }
    Ok(())
}

fn run_push(config: &WikiConfig, args: PushArgs) -> Result<()> {
    let Some(mut context) = build_context(config, OutputTarget::Directory(PathBuf::from(".")))?
    else {
        return Ok(());
    };
    let content = read_document(&args.file)?;
    let title = args.title.unwrap_or_else(|| title_from_path(&args.file));
    let receipt = context.push_source(&title, &content, &args.summary);
    let user = context.logged_in_as().map(ToString::to_string);
    context.logout()?;
    let Some(receipt) = receipt? else {
        return Ok(());
    };

    println!("pushed: {}", receipt.title);
    println!("user: {}", user.as_deref().unwrap_or("<none>"));
    println!("no_change: {}", format_flag(receipt.no_change));
    println!(
        "revision: {}",
        receipt
            .new_revision_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("request_count: {}", context.api().request_count());
    Ok(())
}

fn run_config(config: &WikiConfig) -> Result<()> {
    println!("wiki.host: {}", config.host().as_deref().unwrap_or("<none>"));
    println!("wiki.transfer_protocol: {}", config.transfer_protocol());
    println!("wiki.article_path: {}", config.article_path());
    println!("wiki.api_path: {}", config.api_path());
    println!("wiki.user_agent: {}", config.user_agent());
    println!(
        "wiki.api_url: {}",
        config.api_url().as_deref().unwrap_or("<none>")
    );
    println!(
        "wiki.base_url: {}",
        config.base_url().as_deref().unwrap_or("<none>")
    );
    println!(
        "preview.enable_javascript: {}",
        format_flag(config.preview.enable_javascript)
    );
    println!("preview.get_css: {}", format_flag(config.preview.get_css));
    println!("preview.redirects: {}", format_flag(config.preview.redirects));
    println!("preview.content_model: {}", config.content_model());
    println!(
        "preview.css_bytes: {}",
        config.preview.preview_css_style.len()
    );
    match config.credentials() {
        Some((user, _)) => println!("auth.user_name: {user} (password: <redacted>)"),
        None => println!("auth.user_name: <none>"),
    }
    Ok(())
}

fn report_status(status: &PreviewStatus, output: &Path, strict: bool) -> Result<()> {
    match status {
        PreviewStatus::Rendered { title } => {
            println!("rendered: {title}");
            println!("output: {}", normalize_path(output));
        }
        PreviewStatus::Warning(warning) => eprintln!("warning: {warning}"),
        PreviewStatus::Failed(error) if strict => bail!("{error}"),
        PreviewStatus::Failed(error) => eprintln!("error: {error}"),
        PreviewStatus::Skipped | PreviewStatus::Stale => {
            debug!(?status, "preview not applied");
        }
    }
    Ok(())
}

fn report_soft_failure(error: anyhow::Error) -> Result<()> {
    match error.downcast_ref::<PreviewError>() {
        Some(preview) if preview.is_warning() => {
            eprintln!("warning: {preview}");
            Ok(())
        }
        _ => Err(error),
    }
}

fn print_diagnostics(cli: &Cli, config: &WikiConfig) {
    let path = config_path(cli);
    println!("[diagnostics]");
    println!(
        "config_path={} ({})",
        normalize_path(&path),
        if path.exists() { "found" } else { "missing" }
    );
    println!("api_url={}", config.api_url().as_deref().unwrap_or("<none>"));
    println!(
        "base_url={}",
        config.base_url().as_deref().unwrap_or("<none>")
    );
    println!();
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn modified_at(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .with_context(|| format!("failed to inspect {}", path.display()))
}

fn default_preview_path(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "document".into());
    name.push(".preview.html");
    file.with_file_name(name)
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace('_', " "))
        .unwrap_or_default()
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
