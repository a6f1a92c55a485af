use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use photowall_cache::{CacheConfig, CacheConfigFile, CacheStats, MemoryCache};
use photowall_loader::{DecodedImage, FetchConfig, FetchConfigFile, HttpTransport, ImageDecoder};
use photowall_scheduler::{
    DemandScheduler, FetchPipeline, LoadReport, TaskRegistry, TaskState, ViewportEvent,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

pub mod script;

use script::Step;

#[derive(Debug, Parser)]
#[command(name = "photowall")]
#[command(about = "Viewport-driven image loading over a URL list")]
pub struct Cli {
    /// TOML file with optional [cache] and [fetch] tables.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log cache and scheduler activity to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Settle the viewport once and wait for every fetch.
    Load {
        #[arg(long, value_name = "FILE")]
        urls: PathBuf,
        #[arg(long, default_value_t = 0)]
        first: usize,
        /// Visible item count; defaults to the rest of the list.
        #[arg(long)]
        count: Option<usize>,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Replay a recorded viewport event script.
    Replay {
        #[arg(long, value_name = "FILE")]
        urls: PathBuf,
        /// One `<first> <count> <settled|scrolling>` event per line; a line
        /// reading `idle` waits for in-flight fetches before continuing.
        #[arg(long, value_name = "FILE")]
        events: PathBuf,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    cache: CacheConfigFile,
    #[serde(default)]
    fetch: FetchConfigFile,
}

#[derive(Debug)]
struct Settings {
    cache: CacheConfig,
    fetch: FetchConfig,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    keys: usize,
    events: usize,
    hits: usize,
    launched: usize,
    deduplicated: usize,
    index_errors: Vec<String>,
    completed: usize,
    cancelled: usize,
    failed: Vec<FailureOutput>,
    delivered: usize,
    timed_out: bool,
    cache: CacheOutput,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    key: String,
    error: String,
}

#[derive(Debug, Default, Serialize)]
struct CacheOutput {
    entries: usize,
    memory_used: usize,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected: u64,
    hit_rate: f64,
}

impl From<CacheStats> for CacheOutput {
    fn from(stats: CacheStats) -> Self {
        Self {
            entries: stats.entry_count,
            memory_used: stats.memory_used,
            capacity: stats.capacity,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            rejected: stats.rejected,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Scheduler plus the shared services it was built from
struct Wall {
    scheduler: DemandScheduler<DecodedImage>,
    cache: Arc<MemoryCache<DecodedImage>>,
    registry: Arc<TaskRegistry>,
    delivered: Arc<AtomicUsize>,
    keys: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Load { urls, first, count, timeout_secs } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_load(&urls, first, count, Duration::from_secs(timeout_secs), &settings)
        }
        Commands::Replay { urls, events, timeout_secs } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_replay(&urls, &events, Duration::from_secs(timeout_secs), &settings)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str::<ConfigFile>(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ConfigFile::default(),
    };

    let cache = CacheConfig::default()
        .apply_file(&file.cache)
        .apply_env()
        .context("invalid cache override in environment")?;
    let fetch = FetchConfig::default()
        .apply_file(&file.fetch)
        .apply_env()
        .context("invalid fetch override in environment")?;

    Ok(Settings { cache, fetch })
}

fn read_urls(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    let urls = script::parse_url_list(&text);
    if urls.is_empty() {
        bail!("no URLs in {}", path.display());
    }
    Ok(urls)
}

fn build_wall(urls: Vec<String>, settings: &Settings) -> Wall {
    let cache = Arc::new(MemoryCache::from_config(&settings.cache));
    let registry = Arc::new(TaskRegistry::new());
    let delivered = Arc::new(AtomicUsize::new(0));
    let keys = urls.len();

    let counter = Arc::clone(&delivered);
    let pipeline = FetchPipeline {
        cache: Arc::clone(&cache),
        registry: Arc::clone(&registry),
        transport: Arc::new(HttpTransport::new(&settings.fetch)),
        decoder: Arc::new(ImageDecoder),
        sink: Arc::new(move |key: &str, image: Arc<DecodedImage>| {
            counter.fetch_add(1, Ordering::Relaxed);
            info!("ready {key} ({}x{})", image.width, image.height);
        }),
    };

    info!(
        "wall of {keys} images, cache capacity {} MiB",
        settings.cache.capacity_mb()
    );

    Wall {
        scheduler: DemandScheduler::new(Arc::new(urls), pipeline),
        cache,
        registry,
        delivered,
        keys,
    }
}

fn run_load(
    urls: &Path,
    first: usize,
    count: Option<usize>,
    timeout: Duration,
    settings: &Settings,
) -> Result<()> {
    let urls = read_urls(urls)?;
    let count = count.unwrap_or_else(|| urls.len().saturating_sub(first));

    let mut wall = build_wall(urls, settings);
    let report = wall.scheduler.on_viewport_event(ViewportEvent::settled(first, count));

    print_summary(&finish(wall, vec![report], timeout))
}

fn run_replay(urls: &Path, events: &Path, timeout: Duration, settings: &Settings) -> Result<()> {
    let urls = read_urls(urls)?;
    let text = fs::read_to_string(events)
        .with_context(|| format!("failed to read events {}", events.display()))?;
    let steps = script::parse_script(&text)?;

    let mut wall = build_wall(urls, settings);
    let mut reports = Vec::new();

    let mut segments = steps.split(|step| *step == Step::Idle).peekable();
    while let Some(segment) = segments.next() {
        let events: Vec<ViewportEvent> = segment
            .iter()
            .filter_map(|step| match step {
                Step::Event(event) => Some(*event),
                Step::Idle => None,
            })
            .collect();
        reports.extend(replay_segment(&mut wall, events)?);

        if segments.peek().is_some() && !wall.registry.wait_idle(timeout) {
            warn!("fetches still running after {}s at idle step", timeout.as_secs());
        }
    }

    print_summary(&finish(wall, reports, timeout))
}

/// Feed `events` through the scheduler's event loop from a separate thread.
fn replay_segment(wall: &mut Wall, events: Vec<ViewportEvent>) -> Result<Vec<LoadReport>> {
    let (sender, receiver) = mpsc::channel();
    let feeder = thread::spawn(move || {
        for event in events {
            if sender.send(event).is_err() {
                break;
            }
        }
    });
    let reports = wall.scheduler.run(receiver);
    feeder.join().map_err(|_| anyhow!("event feeder panicked"))?;
    Ok(reports)
}

/// Wait for every launched task and fold the reports into a summary.
fn finish(wall: Wall, reports: Vec<LoadReport>, timeout: Duration) -> Summary {
    let mut summary = Summary { keys: wall.keys, events: reports.len(), ..Default::default() };

    let mut handles = Vec::new();
    for report in reports {
        summary.hits += report.hits.len();
        summary.deduplicated += report.deduplicated.len();
        summary.index_errors.extend(report.index_errors.iter().map(ToString::to_string));
        handles.extend(report.launched);
    }
    summary.launched = handles.len();

    if !wall.registry.wait_idle(timeout) {
        warn!("fetches still running after {}s, cancelling", timeout.as_secs());
        wall.scheduler.on_teardown();
        summary.timed_out = true;
    }

    for handle in handles {
        let task = Arc::clone(handle.task());
        match handle.join() {
            TaskState::Completed => summary.completed += 1,
            TaskState::Cancelled => summary.cancelled += 1,
            TaskState::Failed => summary.failed.push(FailureOutput {
                key: task.key().to_owned(),
                error: task
                    .failure()
                    .map_or_else(|| "unknown failure".to_owned(), |e| e.to_string()),
            }),
            state => warn!("task for {} ended in {state:?}", task.key()),
        }
    }

    summary.delivered = wall.delivered.load(Ordering::Relaxed);
    summary.cache = wall.cache.stats().into();
    summary
}

fn print_summary(summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    println!("{json}");
    Ok(())
}
