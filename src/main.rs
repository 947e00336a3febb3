mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use sf_av::{ProcessRunner, ToolRegistry, Workspace};
use sf_core::config::Config;
use sf_core::CameraMotion;
use sf_pipeline::{
    build_plan, PlanOptions, ProgressSender, RenderPipeline, SegmentBounds, StageTracker,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on --verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "stillforge=debug,sf_pipeline=debug,sf_server=debug,sf_av=debug,sf_db=debug,tower_http=debug"
                .to_string()
        } else {
            "stillforge=info,sf_pipeline=info,sf_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = load_config(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                "Starting stillforge on {}:{}",
                config.server.host,
                config.server.port
            );
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sf_server::start(config))?;
            Ok(())
        }
        Commands::Worker => {
            let config = load_config(cli.config.as_deref());
            tracing::info!("Starting stillforge worker pool");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(sf_server::run_worker_only(config))?;
            Ok(())
        }
        Commands::Render {
            image,
            output,
            duration,
            style,
            seed,
            camera_motion,
        } => {
            let config = load_config(cli.config.as_deref());
            let output = output.unwrap_or_else(|| cli::default_output_path(&image));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(render_local(
                &config,
                &image,
                &output,
                duration,
                &style,
                seed,
                camera_motion,
            ))
        }
        Commands::Plan { duration, json } => {
            let config = load_config(cli.config.as_deref());
            print_plan(&config, duration, json)
        }
        Commands::CheckTools => {
            let config = load_config(cli.config.as_deref());
            check_tools(&config);
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

/// Config file (or defaults) with environment overrides applied.
fn load_config(path: Option<&Path>) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env();
    config
}

async fn render_local(
    config: &Config,
    image: &Path,
    output: &Path,
    duration: u32,
    style: &str,
    seed: Option<u32>,
    camera_motion: Option<CameraMotion>,
) -> Result<()> {
    if !image.is_file() {
        anyhow::bail!("Image does not exist: {}", image.display());
    }

    let render = &config.render;
    let plan = build_plan(
        duration,
        SegmentBounds::from_config(render),
        PlanOptions {
            seed,
            camera_motion,
            subject_lock: None,
        },
    )?;
    tracing::info!(
        segments = plan.len(),
        seed = plan.seed,
        "Rendering {}s from {}",
        duration,
        image.display()
    );

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let pipeline = RenderPipeline::new(Arc::new(ProcessRunner), tools, render);
    let workspace = Workspace::new(render.scratch_dir.as_deref(), "render")?;
    let progress = ProgressSender::new(|pct, stage| {
        tracing::info!(progress = pct, %stage, "progress");
    });

    let outcome = tokio::time::timeout(
        render.job_timeout(),
        pipeline.run(image, &plan, style, &workspace, &progress, &StageTracker::new()),
    )
    .await
    .map_err(|_| anyhow::anyhow!("render exceeded {}s", render.job_timeout_secs))??;

    let final_path = workspace
        .finalize(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Output: {}", final_path.display());
    println!("Segments: {}", outcome.segment_count);
    println!("Duration: {:.3}s", outcome.duration_sec());
    if outcome.enforcement.was_trimmed() {
        println!("Trimmed to the {}s ceiling", sf_core::MAX_VIDEO_DURATION_SECS);
    }
    Ok(())
}

fn print_plan(config: &Config, duration: u32, json: bool) -> Result<()> {
    let plan = build_plan(
        duration,
        SegmentBounds::from_config(&config.render),
        PlanOptions::default(),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Total: {}s in {} segment(s)", plan.total_secs, plan.len());
    for entry in &plan.entries {
        println!("  [{}] {}s", entry.segment_index, entry.duration_sec);
    }
    Ok(())
}

fn check_tools(config: &Config) {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Rendering needs both ffmpeg and ffprobe.");
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            Config::from_json(&text)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("⚠ {warning}");
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Storage: {} (bucket {})",
        config.storage.root.display(),
        config.storage.bucket
    );
    println!(
        "  Segments: {}-{}s, {}s timeout each",
        config.render.segment_min_secs,
        config.render.segment_max_secs,
        config.render.segment_timeout_secs
    );
    println!(
        "  Workers: {} (retries {}, backoff {:?}s)",
        config.worker.concurrency, config.worker.max_retries, config.worker.backoff_secs
    );

    Ok(())
}
