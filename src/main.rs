use anyhow::{Context, Result};
use audioflicker::config::AppConfig;
use audioflicker::energy::{EnergyExtractor, RmsExtractor};
use audioflicker::pipeline::Pipeline;
use audioflicker::synth;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "audioflicker",
    version,
    about = "Turn the loudness of a video's soundtrack into a color-flicker video"
)]
struct Cli {
    /// Path to a config file (defaults to the XDG config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web front end (default)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render one URL and exit
    Render {
        /// Video page URL
        url: String,

        /// Move the finished video here instead of the static directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the energy curve of a local audio file
    Energy {
        /// Audio file to analyze
        path: PathBuf,

        /// Dump the full curve as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Config file < PORT env < CLI flags
    let mut config = AppConfig::load(cli.config.as_deref()).with_env();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let pipeline = Pipeline::from_config(&config);
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            rt.block_on(audioflicker::server::serve(&config, pipeline))?;
        }

        Commands::Render { url, output, json } => {
            config.ensure_dirs().context("Failed to create output directories")?;
            let pipeline = Pipeline::from_config(&config);

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]").unwrap(),
            );
            pb.enable_steady_tick(Duration::from_millis(120));

            let result = pipeline.run_with_progress(&url, |stage| pb.set_message(stage.label()));
            pb.finish_and_clear();
            let mut outcome = result.context("Render failed")?;

            if let Some(dest) = output {
                move_file(&outcome.output_path, &dest)?;
                outcome.output_path = dest;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                match (&outcome.title, &outcome.uploader) {
                    (Some(title), Some(uploader)) => println!("{} ({})", title, uploader),
                    (Some(title), None) => println!("{}", title),
                    _ => {}
                }
                if let Some(secs) = outcome.source_duration_secs {
                    println!("Source length: {:.2}s", secs);
                }
                println!(
                    "Rendered {} frames ({:.2}s of video for {:.2}s of audio) in {:.2}s",
                    outcome.video_frames,
                    outcome.video_duration_secs,
                    outcome.audio_duration_secs,
                    outcome.elapsed_secs
                );
                println!("Output: {}", outcome.output_path.display());
            }
        }

        Commands::Energy { path, json } => {
            let curve = RmsExtractor
                .extract(&path)
                .with_context(|| format!("Failed to analyze {}", path.display()))?;

            if json {
                println!("{}", serde_json::to_string(&curve)?);
                return Ok(());
            }

            let format = config.render.video_format();
            let frames = synth::frame_count(curve.len());
            println!("File:         {}", path.display());
            println!("Frames:       {}", curve.len());
            println!("Audio:        {:.2}s", curve.audio_duration_secs());
            println!("Max RMS:      {:.5}", curve.max());
            match curve.peak_index() {
                Some(i) => match synth::sampled_frame(i) {
                    Some(v) => println!("Peak frame:   {} (video frame {})", i, v),
                    None => println!(
                        "Peak frame:   {} (between sampled frames, every {}th is shown)",
                        i,
                        synth::FRAME_STRIDE
                    ),
                },
                None => println!("Peak frame:   -"),
            }
            println!(
                "Video:        {} frames, {:.2}s at {}",
                frames,
                format.duration_secs(frames),
                format
            );
            if curve.max() <= 0.0 {
                println!("Warning: curve is silent; rendering would fail");
            }
        }
    }

    Ok(())
}

/// Rename, falling back to copy+remove across filesystems.
fn move_file(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)
        .with_context(|| format!("Failed to copy output to {}", to.display()))?;
    std::fs::remove_file(from).ok();
    Ok(())
}
