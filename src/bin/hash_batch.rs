//! Compare every pair of images named in a list file

use anyhow::anyhow;
use clap::Parser;

use std::io::Write;
use std::path::PathBuf;

use robust_hash::batch::{BatchMatcher, Stage};
use robust_hash::cli::{self, HashArgs};

#[derive(Clone, Debug, Parser)]
#[command(
    name = "hash_batch",
    version,
    about = "Write the fingerprint distance of every image pair in a list"
)]
struct Args {
    /// Text file with one image path per line
    list: PathBuf,

    /// Result file; one `<pathA> <pathB> <distance>` line per pair
    output: PathBuf,

    /// Only write pairs at most this far apart
    #[arg(long)]
    max_distance: Option<u32>,

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

    // both files are checked before any image is touched
    let images = cli::read_image_list(&args.list)?;
    let mut out = cli::create_output(&args.output)?;

    let paths: Vec<PathBuf> = images.iter().map(PathBuf::from).collect();

    let mut matcher = BatchMatcher::new(&hasher).on_progress(|progress| {
        if progress.stage == Stage::Hashing {
            cli::print_progress("hashing", progress.done, Some(progress.total));
        }
    });
    if let Some(max_distance) = args.max_distance {
        matcher = matcher.max_distance(max_distance);
    }

    println!("hashing {} images", images.len());
    let report = matcher.run(&paths);
    cli::finish_progress();

    let write_error =
        |e: std::io::Error| anyhow!("can't write to {}: {}", args.output.display(), e);
    for pair in &report.pairs {
        cli::write_pair_line(&mut out, &images[pair.left], &images[pair.right], pair.distance)
            .map_err(write_error)?;
    }
    out.flush().map_err(write_error)?;

    for failure in &report.failures {
        eprintln!("skipped {}: {}", images[failure.index], failure.error);
    }

    println!(
        "{} images, {} pairs written, {} skipped",
        images.len(),
        report.pairs.len(),
        report.failures.len()
    );

    Ok(())
}
