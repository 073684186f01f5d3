//! Find scene changes in a video and save the frames on either side of each cut

use clap::Parser;

use std::path::PathBuf;

use robust_hash::cli::{self, HashArgs};
use robust_hash::scan::{self, ScanConfig, Threshold, DEFAULT_LOOKAHEAD, DEFAULT_SCENE_THRESHOLD};
use robust_hash::video;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "scene_cuts",
    version,
    about = "Detect scene changes by comparing adjacent frame fingerprints"
)]
struct Args {
    /// Video file, or a directory of frame images in name order
    video: PathBuf,

    /// Minimum distance between adjacent frames that counts as a cut
    #[arg(default_value_t = DEFAULT_SCENE_THRESHOLD)]
    threshold: u32,

    /// Only report distances exactly equal to the threshold
    #[arg(long)]
    exact: bool,

    /// Directory the frames around each cut are written to
    #[arg(long, default_value = "scene_cuts")]
    output_dir: PathBuf,

    /// Decoded frames hashed ahead of the comparison step
    #[arg(long, default_value_t = DEFAULT_LOOKAHEAD)]
    lookahead: usize,

    #[command(flatten)]
    hash: HashArgs,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let hasher = args.hash.init()?.to_hasher();

    let threshold = if args.exact {
        Threshold::Exactly(args.threshold)
    } else {
        Threshold::AtLeast(args.threshold)
    };
    let config = ScanConfig::new().threshold(threshold).lookahead(args.lookahead);

    let frames = video::open_video(&args.video)?;
    cli::create_output_dir(&args.output_dir)?;

    let mut seen = 0usize;
    let frames = frames.inspect(|_| {
        seen += 1;
        if seen % 25 == 0 {
            cli::print_progress("frame", seen, None);
        }
    });

    let result = scan::scan(&hasher, frames, &config, |change, previous, current| {
        cli::save_scene_pair(&args.output_dir, change, previous, current)?;
        log::info!(
            "scene change {} -> {} (distance {})",
            change.previous,
            change.current,
            change.distance
        );
        Ok(())
    });
    cli::finish_progress();

    let summary = result?;
    println!(
        "{} frames, {} scene changes written to {}",
        summary.frames,
        summary.events.len(),
        args.output_dir.display()
    );

    Ok(())
}
