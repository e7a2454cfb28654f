//! lipflip CLI -- gain calibration and pyramid blending on image files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};

use lipflip::convert::bgr_f32_raw_to_u8;
use lipflip::convert::bgr_u8_to_f32_normalized;
use lipflip::gain::SamplingMode;
use lipflip::{io, logger, LaplacianBlender, PipelineConfig};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "lipflip")]
#[command(about = "Color-gain calibration and Laplacian pyramid blending for two-camera mouth swaps")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (JSON). Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a gain transform mapping SOURCE colors onto DESTINATION colors
    /// using every pixel.
    FitGain {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        destination: PathBuf,
        /// Where to write the transform (JSON).
        #[arg(long)]
        out: PathBuf,
        /// Optional corrected copy of SOURCE.
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Apply a stored gain transform to an image.
    ApplyGain {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        transform: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Blend LEFT over RIGHT under MASK (white selects LEFT).
    Blend {
        #[arg(long)]
        left: PathBuf,
        #[arg(long)]
        right: PathBuf,
        #[arg(long)]
        mask: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Pyramid levels. Overrides the config file.
        #[arg(long)]
        levels: Option<usize>,
    },
}

fn main() {
    logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::FitGain { source, destination, out, preview } => {
            let src = io::load_bgr(&source)?;
            let dst = io::load_bgr(&destination)?;
            let estimator = config.estimator();
            let transform = estimator.fit(&src, &dst, &SamplingMode::Dense)?;
            io::save_transform(&out, &transform)?;
            info!(path = %out.display(), "transform written");

            if let Some(path) = preview {
                let corrected = estimator.apply(&src, &transform)?;
                io::save_bgr(&path, &bgr_f32_raw_to_u8(&corrected))?;
                info!(path = %path.display(), "preview written");
            }
        }
        Commands::ApplyGain { input, transform, out } => {
            let frame = io::load_bgr(&input)?;
            let transform = io::load_transform(&transform)?;
            let corrected = lipflip::gain::apply(&frame, &transform)?;
            io::save_bgr(&out, &bgr_f32_raw_to_u8(&corrected))?;
            info!(path = %out.display(), "corrected image written");
        }
        Commands::Blend { left, right, mask, out, levels } => {
            let left = bgr_u8_to_f32_normalized(&io::load_bgr(&left)?);
            let right = bgr_u8_to_f32_normalized(&io::load_bgr(&right)?);
            let mask = io::load_mask(&mask)?;

            let mut blend_config = config.blend.clone();
            if let Some(levels) = levels {
                blend_config.levels = levels;
            }
            let blender = LaplacianBlender::from_config(&left, &right, &mask, &blend_config)?;
            info!(levels = blender.effective_levels(), "blending");
            io::save_bgr_normalized(&out, &blender.blend())?;
            info!(path = %out.display(), "blend written");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_json_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}
