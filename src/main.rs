//! Application entry point: the `line-forge` command-line tool.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] (defaults on first run) and apply the API key
//!    environment override.
//! 4. Create the [`tokio`] runtime.
//! 5. Dispatch to `generate`, `probe` or `init-config`.
//!
//! `generate` spawns the run in the background, prints status lines as they
//! arrive, appends every resolved line to the output JSON file and turns
//! ctrl-c into a cooperative cancel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use line_forge::{
    catalog::{Catalog, Category},
    config::{AppConfig, AppPaths, API_KEY_ENV},
    llm::{ApiBackend, CharacterContext, CharacterProvider, FileCharacterProvider, Language},
    pipeline::{spawn_run, Generator, RunEvent, RunRequest},
    store::{JsonFileStore, ResultStore},
};

#[derive(Parser)]
#[command(
    name = "line-forge",
    version,
    about = "Generate short character lines for a catalog of task keys"
)]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate lines for every key in a catalog.
    Generate(GenerateArgs),
    /// Send one short request to check the endpoint, credential and model.
    Probe,
    /// Write the default settings file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Key list: one key per line, or a CSV with a key column.
    #[arg(long)]
    catalog: PathBuf,

    /// Name of the speaking character.
    #[arg(long)]
    character_name: String,

    /// Text file with the character description.
    #[arg(long)]
    character_file: Option<PathBuf>,

    /// Inline character description, used when no file is given or the file
    /// is missing.
    #[arg(long)]
    description: Option<String>,

    /// Target language (中文/zh, English/en, 日本語/ja, or any name).
    #[arg(long)]
    language: Option<String>,

    /// Keys per request (overrides the settings file).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Focus prompts on one category (greeting, reaction, tease, impact,
    /// touch, breath).
    #[arg(long)]
    category: Option<String>,

    /// JSON file receiving resolved lines.  Existing entries are kept.
    /// Defaults to `<data dir>/lines/<catalog name>.json`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not probe the endpoint before starting.
    #[arg(long)]
    skip_probe: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::new().settings_file);

    if let Command::InitConfig { force } = cli.command {
        return cmd_init_config(&settings_path, force);
    }

    let mut config = AppConfig::load_from(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;
    config.apply_env();
    log::info!(
        "line-forge starting (settings: {})",
        settings_path.display()
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command {
        Command::Generate(args) => rt.block_on(cmd_generate(config, args)),
        Command::Probe => rt.block_on(cmd_probe(&config)),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AppConfig::default()
        .save_to(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default settings to {}", path.display());
    println!("Set {API_KEY_ENV} to supply an API key without storing it on disk.");
    Ok(())
}

async fn cmd_probe(config: &AppConfig) -> Result<()> {
    let backend = ApiBackend::from_config(&config.llm);
    println!(
        "Probing {} (model {})...",
        config.llm.base_url,
        config.llm.model
    );
    let reply = backend.probe().await.context("probe failed")?;
    println!("OK: {reply}");
    Ok(())
}

async fn cmd_generate(mut config: AppConfig, args: GenerateArgs) -> Result<()> {
    // --- inputs -----------------------------------------------------------
    let catalog = Catalog::load(&args.catalog)?;
    if catalog.is_empty() {
        bail!("catalog {} contains no keys", args.catalog.display());
    }

    let character = match &args.character_file {
        Some(path) => FileCharacterProvider::new(&args.character_name, path)
            .with_fallback(args.description.clone().unwrap_or_default())
            .character()?,
        None => CharacterContext::new(
            &args.character_name,
            args.description.clone().unwrap_or_default(),
        ),
    };

    let category_hint = match args.category.as_deref() {
        Some(name) => Some(
            Category::parse(name).with_context(|| format!("unknown category '{name}'"))?,
        ),
        None => None,
    };

    if let Some(lang) = &args.language {
        config.generation.language = Language::parse(lang);
    }
    if let Some(size) = args.batch_size {
        config.generation.batch_size = size;
    }

    // --- backend ----------------------------------------------------------
    let backend = ApiBackend::from_config(&config.llm);
    if !args.skip_probe {
        backend
            .probe()
            .await
            .context("endpoint probe failed (use --skip-probe to start anyway)")?;
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| AppPaths::new().output_for(&args.catalog));
    let mut store = JsonFileStore::open(output)?;

    let mut request = RunRequest::new(catalog, character, &config.generation);
    request.category_hint = category_hint;

    // --- run --------------------------------------------------------------
    let generator = Arc::new(Generator::new(backend, &config));
    let mut handle = spawn_run(generator, request);

    let cancel = handle.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling... (finishing the current step)");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            RunEvent::Status(status) => println!("{status}"),
            RunEvent::Resolved { key, text } => {
                println!("  {key}: {text}");
                if let Err(e) = store.put(&key, &text) {
                    log::warn!("store: failed to save {key}: {e}");
                }
            }
        }
    }

    let report = handle.finish().await?;
    println!();
    println!("{}", report.summary());
    if !report.unresolved.is_empty() {
        let keys: Vec<_> = report.unresolved.iter().map(|k| k.as_str()).collect();
        println!("Unresolved: {}", keys.join(", "));
    }
    println!("Lines saved to {}", store.path().display());
    Ok(())
}
