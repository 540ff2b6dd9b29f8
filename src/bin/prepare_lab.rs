//! This script prepares the FAT32 image for the recovery lab.
//!
//! The BMP files of a directory (or generated gradients) are packed into a fresh image, each under
//! its long name, then every second file is deleted so that only its directory slots remain, marked
//! with 0xE5.

use fat_recov::filesystem::lab_image::{Geometry, LabImage};
use fat_recov::recovery::bmp;
use log::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

/// 64 MiB of 512-byte sectors.
const LAB_SECTORS: u32 = 131_072;

const USAGE: &str = "Usage: prepare_lab <IMAGE> (<BMP_DIR> | --generate <N>)";

fn main() -> ExitCode {
    stderrlog::new()
        .module(module_path!())
        .module("fat_recov")
        .verbosity(2usize)
        .init()
        .unwrap_or_else(|e| eprintln!("Failed to initialise logging: {e}"));

    let args: Vec<String> = env::args().collect();
    let files = match args.get(2).map(String::as_str) {
        Some("--generate") => match args.get(3).and_then(|n| n.parse::<u8>().ok()) {
            Some(n) => generated(n),
            None => {
                eprintln!("{USAGE}");
                return ExitCode::from(2);
            }
        },
        Some(dir) => match read_bmp_dir(Path::new(dir)) {
            Ok(files) => files,
            Err(err) => {
                error!("Cannot read {dir}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    // 4 KiB clusters give the root directory 128 slots.
    let mut image = LabImage::new(Geometry {
        sec_per_clus: 8,
        ..Geometry::small(LAB_SECTORS)
    });
    let root = image.root_clus();

    for (i, (name, data)) in files.iter().enumerate() {
        let slots = match image.add_file(root, name, data) {
            Ok(slots) => slots,
            Err(err) => {
                error!("Failed to add {name}: {err}");
                return ExitCode::FAILURE;
            }
        };
        info!("{name}: {} bytes at cluster {}", data.len(), slots.cluster);

        if i % 2 == 1 {
            if let Err(err) = image.delete(&slots) {
                error!("Failed to delete {name}: {err}");
                return ExitCode::FAILURE;
            }
            info!("{name}: deleted");
        }
    }

    match image.write_to(Path::new(&args[1])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Failed to write {}: {err}", args[1]);
            ExitCode::FAILURE
        }
    }
}

fn read_bmp_dir(dir: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut files = vec![];
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.to_ascii_lowercase().ends_with(".bmp") {
            files.push((name, fs::read(entry.path())?));
        }
    }
    Ok(files)
}

fn generated(n: u8) -> Vec<(String, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let side = 32 + 16 * (i as u32 % 8);
            (format!("gradient {i:02}.bmp"), bmp::gradient(side, side, i.wrapping_mul(37)))
        })
        .collect()
}
