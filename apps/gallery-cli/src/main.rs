use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use gallery_assets::{LoadEvent, ProgressTracker};
use gallery_render::{QualityPreset, TextBackend};
use gallery_viewer::{FrameOutcome, HeadlessHost, ViewerConfig, ViewerController};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gallery-cli", about = "CLI tool for gallery assets and headless sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the effective configuration
    Info,
    /// Check that an asset is reachable without downloading it
    Probe {
        /// File path or http(s) URL
        url: String,
    },
    /// Load and normalize an asset, printing progress and a scene summary
    Load {
        /// File path or http(s) URL
        url: String,
        /// Rendering quality: high | performance
        #[arg(short, long)]
        quality: Option<QualityPreset>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a headless session with scripted input
    Simulate {
        /// Asset to load before walking; the fallback cube is shown if it fails
        #[arg(long)]
        asset: Option<String>,
        /// Keys held for the whole run, as key codes
        #[arg(short, long, value_delimiter = ',', default_value = "KeyW")]
        keys: Vec<String>,
        /// Simulated seconds
        #[arg(short, long, default_value = "2.0")]
        seconds: f32,
        /// Interval between frame wakes in milliseconds
        #[arg(long, default_value = "4")]
        wake_ms: u64,
        /// Horizontal mouse motion applied once after locking
        #[arg(long, default_value = "0.0")]
        look: f32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = ViewerConfig::load_or_default(cli.config.as_deref())
        .context("failed to read config")?;

    match cli.command {
        Commands::Info => {
            println!("gallery-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("quality presets: {}, {}", QualityPreset::High, QualityPreset::Performance);
            println!("--- effective config ---");
            print!("{}", config.to_yaml()?);
        }
        Commands::Probe { url } => {
            let report = config.asset_loader().probe(&url)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.reachable {
                bail!("{url} is not reachable");
            }
        }
        Commands::Load { url, quality, json } => {
            let mut config = config;
            if let Some(quality) = quality {
                config.quality = quality;
            }
            load(&config, &url, json)?;
        }
        Commands::Simulate {
            asset,
            keys,
            seconds,
            wake_ms,
            look,
        } => {
            if wake_ms == 0 {
                bail!("--wake-ms must be at least 1");
            }
            simulate(config, asset, &keys, seconds, wake_ms, look)?;
        }
    }

    Ok(())
}

fn load(config: &ViewerConfig, url: &str, json: bool) -> anyhow::Result<()> {
    let mut tracker = ProgressTracker::new(config.asset.indeterminate_bytes_per_percent);
    for event in config.asset_loader().load(url) {
        match event {
            LoadEvent::Progress(progress) => {
                if !json {
                    let percent = tracker.report(progress);
                    println!("loading... {}% ({} bytes)", percent.value(), progress.loaded_bytes);
                }
            }
            LoadEvent::Loaded(asset) => {
                let summary = asset.scene.summary();
                if json {
                    let out = serde_json::json!({
                        "url": asset.url,
                        "digest": asset.digest,
                        "bytes": asset.byte_len,
                        "quality": config.quality,
                        "scene": summary,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                } else {
                    println!("loaded {} ({} bytes, sha256 {})", asset.url, asset.byte_len, asset.short_digest());
                    println!(
                        "nodes={} meshes={} primitives={} vertices={} triangles={}",
                        summary.nodes, summary.meshes, summary.primitives, summary.vertices, summary.triangles
                    );
                    println!("materials={} textures={}", summary.materials, summary.textures);
                    if let Some((min, max)) = summary.bounds {
                        println!("bounds: {min:?} .. {max:?}");
                    }
                }
            }
            LoadEvent::Failed(e) => bail!("failed to load {url}: {e}"),
        }
    }
    Ok(())
}

fn simulate(
    config: ViewerConfig,
    asset: Option<String>,
    keys: &[String],
    seconds: f32,
    wake_ms: u64,
    look: f32,
) -> anyhow::Result<()> {
    let loader = config.asset_loader();
    let host = HeadlessHost::new();
    let mut viewer = ViewerController::new(config);
    let session = viewer.mount(TextBackend::new(), Box::new(host.clone()), 1280, 720)?;
    println!("session {session}");

    if let Some(url) = asset {
        let ticket = viewer.begin_load(&url)?;
        for event in loader.load(&url) {
            viewer.deliver(ticket, event);
        }
    }

    if !viewer.on_click() {
        bail!("headless pointer lock was denied");
    }
    for key in keys {
        if !viewer.on_key_down(key) {
            tracing::warn!(key = %key, "key has no effect");
        }
    }
    if look != 0.0 {
        viewer.on_mouse_motion(look, 0.0);
    }

    let wakes = (seconds.max(0.0) * 1000.0) as u64 / wake_ms;
    let mut failures = 0;
    for i in 0..=wakes {
        if let FrameOutcome::RenderFailed(e) = viewer.on_frame(Duration::from_millis(i * wake_ms)) {
            tracing::error!("frame {i} failed: {e}");
            failures += 1;
        }
    }

    for line in viewer.status().lines() {
        println!("{line}");
    }
    if let Some(session) = viewer.session() {
        let pose = session.pose();
        let stats = session.scheduler_stats();
        println!(
            "wakes={} renders={} throttled={} failed={failures}",
            stats.wakes,
            session.renderer().frames_rendered(),
            stats.skipped_throttled
        );
        println!(
            "pose: position=({:.3}, {:.3}, {:.3}) yaw={:.1} pitch={:.1}",
            pose.position.x,
            pose.position.y,
            pose.position.z,
            pose.yaw.to_degrees(),
            pose.pitch.to_degrees()
        );
        if let Some(frame) = session.renderer().backend().last_frame() {
            println!("last frame: {frame}");
        }
    }

    viewer.close();
    println!("lock requests={} releases={}", host.lock_requests(), host.releases());
    Ok(())
}
