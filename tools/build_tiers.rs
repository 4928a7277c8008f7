use std::path::{Path, PathBuf};

use byte_unit::{Byte, UnitType};
use clap::Parser;
use rayon::prelude::*;

use bevy_progressive_points::{
    QualityTier,
    io::ply::{decode_ply, gzip, write_ascii_ply},
    sample,
};


/// Writes the gzip ascii ply tiers of a source ply, `<stem>_<tier>.ply.gz`.
#[derive(Debug, Parser)]
#[command(about = "build progressive quality tiers from a ply file", version, long_about = None)]
struct BuildTiers {
    /// source ply, ascii or binary, optionally gzip compressed
    input: PathBuf,

    /// output directory, defaults to `compressed/` next to the input
    #[arg(long)]
    output: Option<PathBuf>,

    /// overwrite tiers that already exist
    #[arg(long, default_value = "false")]
    force: bool,
}


fn stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    name.strip_suffix(".ply.gz")
        .or_else(|| name.strip_suffix(".ply"))
        .unwrap_or(&name)
        .to_string()
}

fn size(bytes: u64) -> String {
    format!(
        "{:.2}",
        Byte::from_u64(bytes).get_appropriate_unit(UnitType::Decimal)
    )
}


fn main() {
    let args = BuildTiers::parse();

    let payload = std::fs::read(&args.input).expect("failed to read input ply");
    let cloud = decode_ply(&payload).expect("failed to decode input ply");

    println!(
        "building tiers of `{}` ({} points, {})",
        args.input.display(),
        cloud.vertex_count(),
        size(payload.len() as u64),
    );

    let output = args.output.clone().unwrap_or_else(|| {
        args.input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("compressed")
    });
    std::fs::create_dir_all(&output).expect("failed to create output directory");

    let stem = stem(&args.input);

    let reports = QualityTier::ALL
        .par_iter()
        .map(|&tier| {
            let path = output.join(format!("{stem}_{tier}.ply.gz"));
            if path.exists() && !args.force {
                return format!("{tier}: skipped, `{}` exists", path.display());
            }

            let sampled = sample(&cloud, tier.source_ratio());
            let text = write_ascii_ply(&sampled);
            let compressed = gzip(text.as_bytes()).expect("failed to compress tier");
            std::fs::write(&path, &compressed).expect("failed to write tier");

            format!(
                "{tier}: {} points, {} -> {} ({:.1}x) `{}`",
                sampled.vertex_count(),
                size(text.len() as u64),
                size(compressed.len() as u64),
                text.len() as f64 / compressed.len().max(1) as f64,
                path.display(),
            )
        })
        .collect::<Vec<_>>();

    for report in reports {
        println!("{report}");
    }
}
