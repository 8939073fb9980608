use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use choreo_render_core::capture::{ProgressReporter, ProgressUpdate, StagingStore};
use choreo_render_core::record::LiveAssessment;
use choreo_render_core::{
    AppConfig, LiveHarness, OfflineRenderer, ProcessSurface, RenderReport, Result,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const BAR_CELLS: usize = 50;

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    let outcome = match cli.command {
        Commands::Render {
            choreography,
            audio,
            overrides,
        } => run_render(&choreography, &audio, &overrides),
        Commands::Live { overrides } => run_live(&overrides),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_render(choreography: &Path, audio: &Path, overrides: &Overrides) -> Result<bool> {
    let config = overrides.resolve()?;
    tracing::info!(?choreography, ?audio, fps = config.render.fps, "starting offline render");

    let surface = config.surface.clone();
    let report = OfflineRenderer::new(config)
        .with_progress(Box::new(ProgressBar::default()))
        .render(choreography, audio, || ProcessSurface::spawn(&surface))?;

    print_summary(&report);
    Ok(true)
}

fn run_live(overrides: &Overrides) -> Result<bool> {
    let config = overrides.resolve()?;
    tracing::info!(tick_hz = config.live.tick_hz, "starting live recording check");

    let surface = ProcessSurface::spawn(&config.surface)?;
    let store = StagingStore::recreate(&config.live.staging_dir)?;
    let assessment = LiveHarness::new(config.live.clone()).run(surface, Box::new(store))?;

    print_assessment(&assessment);
    Ok(assessment.passed())
}

fn print_summary(report: &RenderReport) {
    let stats = &report.capture.stats;
    println!("rendered {} frames in {:.1}s", report.capture.frames, report.elapsed.as_secs_f64());
    println!("  direct:   {}", stats.direct);
    println!("  buffered: {}", stats.buffered);
    println!("output: {}", report.output.display());
    println!("realtime factor: {:.2}x", report.realtime_factor());
}

fn print_assessment(assessment: &LiveAssessment) {
    let stats = &assessment.stats;
    let mark = |ok: bool| if ok { "ok" } else { "FAILED" };
    println!(
        "frames captured:    {} (min {}) [{}]",
        stats.frames,
        assessment.min_frames,
        mark(assessment.captured_frames())
    );
    println!(
        "switches completed: {}/{} [{}]",
        stats.switches,
        assessment.expected_switches,
        mark(assessment.switches_completed())
    );
    println!("zero-context ticks: {}", stats.zero_context_ticks);
    println!("buffered ticks:     {} [{}]", stats.buffered, mark(assessment.buffer_engaged()));
    println!("skipped ticks:      {}", stats.skipped);
    println!("survived switches:  {}", mark(assessment.survived_switches));
    println!("stopped cleanly:    {}", mark(assessment.stopped_cleanly));
    println!("result: {}", if assessment.passed() { "PASS" } else { "FAIL" });
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Fixed-width progress bar redrawn in place on stderr.
#[derive(Debug, Default)]
struct ProgressBar {
    drawn: bool,
}

impl ProgressReporter for ProgressBar {
    fn report(&mut self, update: ProgressUpdate) {
        let filled = if update.total == 0 {
            BAR_CELLS
        } else {
            (update.completed.min(update.total) as usize * BAR_CELLS) / update.total as usize
        };
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r[{}{}] {:5.1}% ({}/{})",
            "#".repeat(filled),
            " ".repeat(BAR_CELLS - filled),
            update.percent(),
            update.completed,
            update.total
        );
        let _ = stderr.flush();
        self.drawn = true;
    }

    fn finish(&mut self) {
        if self.drawn {
            eprintln!();
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Render visualiser choreographies to video", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a choreography against an audio track into an MP4.
    Render {
        /// Choreography JSON produced by the editor.
        choreography: PathBuf,
        /// Audio track that sets the video length.
        audio: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Record from a live surface across visual-system switches and report
    /// whether capture held up.
    Live {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(clap::Args, Debug)]
struct Overrides {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    staging_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Command that launches the render surface host.
    #[arg(long)]
    surface_cmd: Option<String>,
}

impl Overrides {
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(fps) = self.fps {
            config.render.fps = fps;
        }
        if let Some(dir) = &self.staging_dir {
            config.render.staging_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.render.output_dir = dir.clone();
        }
        if let Some(command) = &self.surface_cmd {
            config.surface.command = command.clone();
        }
        Ok(config)
    }
}
