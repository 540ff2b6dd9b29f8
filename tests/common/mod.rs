#![allow(dead_code)]

use fat_recov::filesystem::lab_image::{Geometry, LabImage};
use fat_recov::recovery::bmp;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tempfile::TempDir;

/// Writes `image` into a fresh temporary directory.
pub fn write_image(image: &LabImage) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fs.img");
    image.write_to(&path).unwrap();
    (tmp, path)
}

/// A 1024-sector image with 512-byte clusters.
pub fn small_image() -> LabImage {
    LabImage::new(Geometry::small(1024))
}

/// One cluster: a valid 54-byte header declaring a 512-byte file, then 458 arbitrary bytes.
pub fn one_cluster_bmp() -> Vec<u8> {
    let mut data = bmp::gradient(8, 8, 0)[..54].to_vec();
    data[2..6].copy_from_slice(&512u32.to_le_bytes());
    data.extend((0..458u32).map(|i| (i * 7 % 251) as u8));
    data
}

struct Capture;

static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
static LOGGER: Capture = Capture;
static INIT: Once = Once::new();

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

/// Installs a logger recording every message of the test binary.
pub fn capture_logs() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Debug);
    });
}

/// Whether a warning containing every fragment of `needles` was logged.
pub fn warned(needles: &[&str]) -> bool {
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .any(|(level, msg)| *level == Level::Warn && needles.iter().all(|n| msg.contains(n)))
}
