//! Compare two images and print their fingerprint distance

use clap::Parser;

use std::path::Path;

use robust_hash::cli::{self, HashArgs};

#[derive(Clone, Debug, Parser)]
#[command(name = "hash_pair", version, about = "Print the fingerprint distance between two images")]
struct Args {
    /// First image
    left: String,

    /// Second image
    right: String,

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

    let hash1 = hasher.hash_source(Path::new(&args.left))?;
    let hash2 = hasher.hash_source(Path::new(&args.right))?;

    log::info!("{}: {}", args.left, hash1);
    log::info!("{}: {}", args.right, hash2);

    println!("{}", cli::format_single(&args.left, &args.right, hash1.dist(&hash2)));

    Ok(())
}
