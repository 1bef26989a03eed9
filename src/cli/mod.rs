use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::{collections::HashSet, path::PathBuf, process::ExitCode};

use crate::{
    art::{self, search::DeezerSearch},
    audio::{
        self, AcquireReport, Verdict,
        deps,
        extractor::{AudioFetcher, YtDlp},
    },
    config::{AudioConfig, Config},
    domain::{slug::assign_missing_ids, track::DownloadEntry},
    http::server::ClipServer,
    interrupt,
    storage::{dataset::Dataset, fs::AudioDir},
};

const RULE: &str = "============================================================";

#[derive(Parser)]
#[command(name = "trackprep")]
#[command(version = "0.1")]
#[command(about = "Maintenance tools for the music game's track dataset")]
pub struct Cli {
    /// Path to an optional config TOML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset JSON file, overrides the config
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fill in album art URLs from the search API
    Art,
    /// Download a trimmed audio clip for every track
    Audio {
        /// Directory the clips are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Derive missing track ids from titles
    Ids,
    /// Show which tracks have their clip, without downloading
    Status {
        /// Directory the clips are read from
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Serve the downloaded clips to the game over HTTP
    Serve {
        /// Directory the clips are served from
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Port to listen on, overrides the config
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Entrypoint for CLI
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dataset) = cli.dataset {
        cfg.dataset.path = dataset;
    }

    match cli.command {
        Commands::Art => run_art(&cfg),
        Commands::Audio { output_dir } => {
            if let Some(dir) = output_dir {
                cfg.audio.output_dir = dir;
            }
            run_audio(&cfg)
        }
        Commands::Ids => run_ids(&cfg),
        Commands::Status { output_dir } => {
            if let Some(dir) = output_dir {
                cfg.audio.output_dir = dir;
            }
            run_status(&cfg)
        }
        Commands::Serve { output_dir, port } => {
            if let Some(dir) = output_dir {
                cfg.audio.output_dir = dir;
            }
            if let Some(port) = port {
                cfg.http.port = port;
            }
            run_serve(&cfg)
        }
    }
}

fn run_art(cfg: &Config) -> anyhow::Result<()> {
    interrupt::exit_on_ctrl_c("Art update cancelled by user, music.json left untouched")?;

    let mut dataset = Dataset::load(&cfg.dataset.path)?;
    let search = DeezerSearch::new(&cfg.art);

    let report = art::enrich(&mut dataset.records, &search, cfg.art.delay());
    dataset.save()?;

    println!(
        "Updated {} with album art: {} updated, {} kept original",
        dataset.path().display(),
        report.updated,
        report.unchanged
    );
    Ok(())
}

fn run_ids(cfg: &Config) -> anyhow::Result<()> {
    let mut dataset = Dataset::load(&cfg.dataset.path)?;

    let assigned = assign_missing_ids(&mut dataset.records);
    if assigned > 0 {
        dataset.save()?;
        println!("\nUpdated {} with {} new id(s)", dataset.path().display(), assigned);
    } else {
        println!("\nEvery track already has an id, nothing to update");
    }
    Ok(())
}

fn run_audio(cfg: &Config) -> anyhow::Result<()> {
    interrupt::exit_on_ctrl_c("Download cancelled by user")?;

    println!("{RULE}");
    println!("Audio clip downloader ({})", cfg.audio.extractor);
    println!("{RULE}");
    println!();

    let extractor = check_dependencies(&cfg.audio)?;
    let fetcher = YtDlp::new(extractor, cfg.audio.clone());

    let report = acquire_dataset(cfg, &fetcher)?;

    let dir = AudioDir::new(&cfg.audio.output_dir);
    print_summary(&report, &dir);
    print_verdict(&report, &dir);
    Ok(())
}

/// Loads the dataset, prepares the output directory and fetches every missing clip.
///
/// Fails when the dataset cannot be read, the directory cannot be created or no record
/// is downloadable. Individual download failures end up in the report.
fn acquire_dataset(cfg: &Config, fetcher: &impl AudioFetcher) -> anyhow::Result<AcquireReport> {
    let dataset = Dataset::load(&cfg.dataset.path)?;
    if dataset.is_empty() {
        log::warn!("{} holds no songs", dataset.path().display());
    } else {
        log::info!("Loaded {} songs from {}", dataset.len(), dataset.path().display());
    }

    let dir = AudioDir::new(&cfg.audio.output_dir);
    dir.ensure()
        .with_context(|| format!("failed to create {}", dir.root().display()))?;
    log::info!("Audio directory: {}", dir.display_path().display());

    println!();
    log::info!("Validating entries...");
    let validation = audio::validate(&dataset.records);
    if validation.entries.is_empty() {
        println!("Ensure each entry has 'id' and 'url' fields");
        return Err(anyhow!("No valid entries found in {}", dataset.path().display()));
    }
    log::info!("{} valid entries to download", validation.entries.len());

    println!();
    println!("Downloading audio...");
    println!("{}", "-".repeat(RULE.len()));

    Ok(audio::acquire(&validation.entries, &dir, fetcher))
}

fn check_dependencies(config: &AudioConfig) -> anyhow::Result<PathBuf> {
    match deps::check(config) {
        Ok(found) => {
            log::info!("{} is installed", config.extractor);
            match &found.transcoder {
                Some(path) => log::info!("{} is available ({})", config.transcoder, path.display()),
                None => {
                    log::warn!("{} not found, audio conversion may fail", config.transcoder);
                    log::warn!("   Install from: https://ffmpeg.org/download.html");
                }
            }
            Ok(found.extractor)
        }
        Err(e) => {
            print_hint(e.install_hint());
            Err(e.into())
        }
    }
}

/// Clip coverage of the dataset, read from disk only
#[derive(Debug)]
struct StatusReport {
    pub songs: usize,
    pub rejected: usize,
    pub present: Vec<DownloadEntry>,
    pub missing: Vec<DownloadEntry>,
    /// audio files in the directory no valid record points to
    pub unreferenced: Vec<PathBuf>,
}

impl StatusReport {
    /// Counts as if a run had skipped every clip already on disk
    pub fn as_acquire_report(&self) -> AcquireReport {
        AcquireReport {
            skipped: self.present.len(),
            expected: self.present.len() + self.missing.len(),
            ..AcquireReport::default()
        }
    }
}

fn collect_status(cfg: &Config) -> anyhow::Result<StatusReport> {
    let dataset = Dataset::load(&cfg.dataset.path)?;
    let dir = AudioDir::new(&cfg.audio.output_dir);

    let validation = audio::validate(&dataset.records);
    let unreferenced = {
        let known: HashSet<&str> = validation.entries.iter().map(|e| e.id.as_str()).collect();
        dir.unreferenced(&known)
    };
    let (present, missing): (Vec<_>, Vec<_>) = validation
        .entries
        .into_iter()
        .partition(|entry| dir.has_clip(&entry.id));

    Ok(StatusReport {
        songs: dataset.len(),
        rejected: validation.rejected.len(),
        present,
        missing,
        unreferenced,
    })
}

fn run_status(cfg: &Config) -> anyhow::Result<()> {
    let status = collect_status(cfg)?;
    let dir = AudioDir::new(&cfg.audio.output_dir);

    println!("Dataset {} contains {} songs", cfg.dataset.path.display(), status.songs);
    println!(
        "{} valid, {} skipped for missing fields",
        status.present.len() + status.missing.len(),
        status.rejected
    );
    println!("Clips present: {}", status.present.len());
    if !status.missing.is_empty() {
        println!("Clips missing ({}):", status.missing.len());
        for entry in &status.missing {
            println!("    - {} ({}, song {})", entry.id, entry.title, entry.position);
        }
    }
    if !status.unreferenced.is_empty() {
        println!("Files not referenced by any song ({}):", status.unreferenced.len());
        for path in &status.unreferenced {
            println!("    - {}", path.to_string_lossy());
        }
    }
    println!();

    print_verdict(&status.as_acquire_report(), &dir);
    Ok(())
}

fn run_serve(cfg: &Config) -> anyhow::Result<()> {
    let dir = AudioDir::new(&cfg.audio.output_dir);
    if !dir.root().is_dir() {
        log::warn!(
            "{} does not exist yet, every clip request will be answered with 404",
            dir.display_path().display()
        );
    }

    let server = ClipServer::new(dir, cfg.http.clone());
    println!(
        "Serving clips from {} at http://{}/api/audio?id=<id>",
        cfg.audio.output_dir.display(),
        server.address()
    );
    println!("Press Ctrl+C to stop");
    server.run()
}

fn print_summary(report: &AcquireReport, dir: &AudioDir) {
    println!();
    println!("{RULE}");
    println!("Summary");
    println!("{RULE}");
    println!("Downloaded: {}", report.downloaded);
    println!("Skipped:    {} (already existed)", report.skipped);
    println!("Failed:     {}", report.failed());
    for (id, e) in &report.failures {
        println!("    - {id}: {e}");
    }
    println!("Location:   {}", dir.display_path().display());
    println!();
}

fn print_verdict(report: &AcquireReport, dir: &AudioDir) {
    match report.verdict() {
        Verdict::NotReady => {
            println!("NOT READY FOR DEPLOYMENT");
            println!();
            println!(
                "{} song(s) failed to download. This might be due to:",
                report.failed()
            );
            println!("   - Internet connection issues");
            println!("   - The source site blocking automated downloads");
            println!("   - Invalid or removed URLs in the dataset");
            println!("   - ffmpeg not installed or not in PATH");
            println!();
            println!("Action required:");
            println!("  1. Fix the issues above");
            println!("  2. Run this command again (existing files will be skipped)");
            println!(
                "  3. Ensure all {} songs download successfully",
                report.expected
            );
            println!();
        }
        Verdict::Ready => {
            println!("ALL SONGS DOWNLOADED SUCCESSFULLY!");
            println!("Ready to deploy!");
            println!();
            println!("Next steps:");
            println!("  1. Run: trackprep art, to refresh album art");
            println!("  2. Verify audio files in {}", dir.root().display());
            println!("  3. Test the game locally");
            println!("  4. Deploy");
            println!();
        }
        Verdict::Unexpected => {
            println!("Unexpected state - please verify audio files manually");
            println!(
                "   Expected {} songs, found {}",
                report.expected,
                report.present()
            );
        }
    }
}

fn print_hint(lines: &[&str]) {
    println!();
    for line in lines {
        println!("{line}");
    }
}
