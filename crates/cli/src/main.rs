use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use pixel_spark_core::{
    BatchOrchestrator, PixelSpark, ProcessedGroup, Settings, SourceImage,
    catalog::{self, AspectRatioSpec},
    export::{self, ExportLayout, ExportOptions, ResolutionReport},
    init,
};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate images and cut them into icon, banner and cover sizes", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate candidates from a prompt, pick some, and export every size
    Generate(GenerateArgs),
    /// Crop and resize local image files without calling the API
    Process(ProcessArgs),
    /// List aspect ratios, sizes and models
    Catalog,
    /// Show or change the saved API key and model
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Save the API key
    SetKey { key: String },
    /// Save the image model
    SetModel { model: String },
}

#[derive(Args, Debug)]
struct SizingArgs {
    /// Aspect ratio key (see `catalog`)
    #[arg(short, long, default_value = "SQUARE")]
    aspect: String,

    /// Size keys to produce; defaults to every size of the aspect ratio
    #[arg(short, long = "size")]
    sizes: Vec<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output directory
    #[arg(short, long, default_value = "pixel-spark-output")]
    out: PathBuf,

    /// File name prefix
    #[arg(long, default_value = export::DEFAULT_PREFIX)]
    prefix: String,

    /// Do not write the original images
    #[arg(long)]
    no_originals: bool,

    /// One folder per source image instead of numbered file names
    #[arg(long, conflicts_with = "zip")]
    per_source: bool,

    /// Pack everything into <prefix>_all_images.zip
    #[arg(long)]
    zip: bool,
}

impl ExportArgs {
    fn options(&self) -> ExportOptions {
        ExportOptions {
            prefix: self.prefix.clone(),
            include_originals: !self.no_originals,
            layout: if self.zip {
                ExportLayout::Zip
            } else if self.per_source {
                ExportLayout::PerSource
            } else {
                ExportLayout::Flat
            },
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Description of the image
    #[arg(trailing_var_arg = true, required = true)]
    prompt: Vec<String>,

    #[command(flatten)]
    sizing: SizingArgs,

    #[command(flatten)]
    export: ExportArgs,

    /// Number of candidates to generate (1-4)
    #[arg(short, long, default_value_t = 4)]
    count: u32,

    /// Candidates to keep, 1-based and comma separated; asks when omitted
    #[arg(long, value_delimiter = ',')]
    select: Vec<usize>,

    /// Refine the prompt once before selecting
    #[arg(long)]
    refine: Option<String>,

    /// Override the saved model for this run
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Image files to process
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    sizing: SizingArgs,

    #[command(flatten)]
    export: ExportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup
    init();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Generate(args) => generate(args).await,
        Command::Process(args) => process(args).await,
        Command::Catalog => {
            print_catalog();
            Ok(())
        }
        Command::Settings { action } => settings(action.unwrap_or(SettingsAction::Show)),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn aspect_ratio(key: &str) -> Result<&'static AspectRatioSpec> {
    catalog::aspect_ratio(key).with_context(|| {
        let keys: Vec<_> = catalog::ASPECT_RATIOS.iter().map(|a| a.key).collect();
        format!("Unknown aspect ratio {key}, expected one of {}", keys.join(", "))
    })
}

fn size_keys(aspect: &AspectRatioSpec, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        aspect.all_size_keys()
    } else {
        requested.to_vec()
    }
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let mut app = PixelSpark::new();
    if let Some(m) = args.model {
        app.config_mut().model_name = m;
    }
    if !app.config().has_api_key() {
        bail!("API Key not set. Run `pixel-spark settings set-key <KEY>` or set GEMINI_API_KEY");
    }

    let aspect = aspect_ratio(&args.sizing.aspect)?;
    let keys = size_keys(aspect, &args.sizing.sizes);
    let prompt = args.prompt.join(" ");
    let mut session = app
        .session()
        .context("Failed to create the Gemini client")?
        .with_count(args.count);

    let progress = spinner(format!("Generating images with {}...", app.config().model_name))?;
    let result = session.generate(&prompt, aspect.key, keys.as_slice()).await.map(|_| ());
    progress.finish_and_clear();
    result.context("Image generation failed")?;

    if let Some(refinement) = &args.refine {
        let progress = spinner("Refining...".to_string())?;
        let result = session.refine(refinement).await.map(|_| ());
        progress.finish_and_clear();
        result.context("Refinement failed")?;
    }

    let candidates = session.state().generated.clone();
    let preview_dir = args.export.out.join("candidates");
    write_candidates(&candidates, &preview_dir)?;
    println!(
        "{} candidate(s) for \"{}\" written to {}",
        candidates.len(),
        session.state().prompt,
        preview_dir.display()
    );

    let picks = if args.select.is_empty() {
        ask_selection(candidates.len())?
    } else {
        check_selection(&args.select, candidates.len())?
    };
    let ids: Vec<String> = picks.iter().map(|&n| candidates[n - 1].id.clone()).collect();

    let progress = spinner(format!("Processing {} image(s)...", ids.len()))?;
    let result = session.proceed_with_selection(ids.as_slice()).await.map(|_| ());
    progress.finish_and_clear();
    result.context("Processing failed")?;

    finish(session.groups(), &args.export)
}

async fn process(args: ProcessArgs) -> Result<()> {
    let aspect = aspect_ratio(&args.sizing.aspect)?;
    let keys = size_keys(aspect, &args.sizing.sizes);

    let mut sources = Vec::with_capacity(args.files.len());
    for (path, id) in args.files.iter().zip(source_ids(&args.files)) {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(SourceImage::new(id, bytes));
    }

    let mut batch = BatchOrchestrator::new();
    let progress = spinner(format!("Processing {} image(s)...", sources.len()))?;
    let result = batch.derive_all(sources, aspect, keys.as_slice()).await.map(|_| ());
    progress.finish_and_clear();
    result.context("Processing failed")?;

    for id in &batch.report().failed_sources {
        eprintln!("Warning: {} could not be cropped and was skipped", id);
    }
    finish(batch.groups(), &args.export)
}

/// File stems as source ids; stems shared by several files get their
/// 1-based position in front (`2-logo`).
fn source_ids(paths: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = paths
        .iter()
        .map(|path| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
        .collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *seen.entry(stem.as_str()).or_default() += 1;
    }
    stems
        .iter()
        .enumerate()
        .map(|(i, stem)| {
            if seen[stem.as_str()] > 1 {
                format!("{}-{}", i + 1, stem)
            } else {
                stem.clone()
            }
        })
        .collect()
}

fn finish(groups: &[ProcessedGroup], export_args: &ExportArgs) -> Result<()> {
    for (id, dims) in ResolutionReport::for_groups(groups).entries {
        if dims.is_unknown() {
            println!("{id}: original resolution unknown");
        } else {
            println!("{id}: original {dims}");
        }
    }

    let failed: usize = groups.iter().map(|g| g.failed.len()).sum();
    if failed > 0 {
        eprintln!("Warning: {failed} size(s) failed and were skipped");
    }

    let written = export::export_groups(groups, &export_args.out, &export_args.options())
        .with_context(|| format!("Failed to write to {}", export_args.out.display()))?;
    for path in &written {
        println!("  {}", path.display());
    }
    println!("{} file(s) written", written.len());
    Ok(())
}

fn write_candidates(candidates: &[SourceImage], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (i, candidate) in candidates.iter().enumerate() {
        let ext = export::extension_for(&candidate.pixels);
        fs::write(dir.join(format!("candidate_{}.{}", i + 1, ext)), &candidate.pixels[..])?;
    }
    Ok(())
}

fn ask_selection(count: usize) -> Result<Vec<usize>> {
    print!("Select images to keep, e.g. 1,3 (default: all): ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    parse_selection(&input, count)
}

fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("all") {
        return Ok((1..=count).collect());
    }
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let n: usize = s.parse().with_context(|| format!("Not a number: {s}"))?;
            in_range(n, count)
        })
        .collect()
}

/// Validates picks given on the command line the same way as typed ones.
fn check_selection(picks: &[usize], count: usize) -> Result<Vec<usize>> {
    picks.iter().map(|&n| in_range(n, count)).collect()
}

fn in_range(n: usize, count: usize) -> Result<usize> {
    if n == 0 || n > count {
        bail!("{n} is out of range 1-{count}");
    }
    Ok(n)
}

fn print_catalog() {
    println!("Aspect ratios:");
    for aspect in catalog::ASPECT_RATIOS {
        println!("  {:<14} {}", aspect.key, aspect.label);
        for size in aspect.candidate_sizes {
            println!("      {:<20} {}", size.key, size.label);
        }
    }
    println!("Models:");
    for model in catalog::AVAILABLE_IMAGE_MODELS {
        println!("  {:<26} {}", model.key, model.label);
    }
}

fn settings(action: SettingsAction) -> Result<()> {
    let mut app = PixelSpark::new();
    match action {
        SettingsAction::Show => {
            let current = app.settings();
            let key = match current.api_key() {
                Some(k) => mask(k),
                None if app.config().has_api_key() => "(from environment)".to_string(),
                None => "(not set)".to_string(),
            };
            println!("API key: {key}");
            match current.model() {
                Some(model) => println!("Model:   {model}"),
                None => println!("Model:   {} (not saved)", app.config().model_name),
            }
            if let Some(path) = Settings::config_path() {
                println!("File:    {}", path.display());
            }
        }
        SettingsAction::SetKey { key } => {
            let updated = Settings {
                api_key: key.trim().to_string(),
                ..app.settings().clone()
            };
            app.save_settings(updated).context("Failed to save settings")?;
            println!("API key saved");
        }
        SettingsAction::SetModel { model } => {
            if !catalog::is_known_model(&model) {
                bail!("Unknown model {model}, see `pixel-spark catalog`");
            }
            let updated = Settings {
                model,
                ..app.settings().clone()
            };
            app.save_settings(updated).context("Failed to save settings")?;
            println!("Model saved");
        }
    }
    Ok(())
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{visible}")
}
