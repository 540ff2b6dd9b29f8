//! BMP header decoding and the content heuristics used to carve BMP files.
//!
//! Only uncompressed 24-bit images are recognised. The pixel test is deliberately permissive: it is
//! used to extend a file whose header was already found, never to start one.

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::io;

/// Size of the file header plus the BITMAPINFOHEADER.
pub const BMP_HEADER_SIZE: usize = 54;

/// Largest width or height accepted by the strict header test.
const MAX_DIMENSION: i32 = 10_000;

/// Adjacent pixels whose summed channel difference is below this are considered smooth.
const SMOOTHNESS_THRESHOLD: u32 = 48;

/// A cluster is pixel-like when more than one pair in this many is smooth.
const SMOOTH_PAIR_RATIO: usize = 15;

/// The 54-byte header of an uncompressed BMP file.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little, magic = b"BM")]
pub struct BmpHeader {
    /// Size of the whole file in bytes
    #[get = "pub"]
    file_size: u32,
    _reserved: [u16; 2],
    #[get = "pub"]
    data_offset: u32,
    #[get = "pub"]
    info_size: u32,
    #[get = "pub"]
    width: i32,
    /// Negative for top-down images
    #[get = "pub"]
    height: i32,
    _planes: u16,
    #[get = "pub"]
    bits_per_pixel: u16,
    _compression: u32,
    _image_size: u32,
    _x_pels_per_meter: i32,
    _y_pels_per_meter: i32,
    _clr_used: u32,
    _clr_important: u32,
}

impl BmpHeader {
    /// Decodes the header at the start of `buf`.
    pub fn from_slice(buf: &[u8]) -> Result<Self, binread::Error> {
        if buf.len() < BMP_HEADER_SIZE {
            return Err(binread::Error::Io(io::Error::from(
                io::ErrorKind::UnexpectedEof,
            )));
        }
        let mut reader = io::Cursor::new(buf);
        reader.read_le()
    }

    /// Cross-checks the fields an incidental "BM" byte pair is unlikely to get right.
    pub fn is_plausible(&self) -> bool {
        self.data_offset as usize >= BMP_HEADER_SIZE
            && self.info_size >= 40
            && self.bits_per_pixel == 24
            && (1..MAX_DIMENSION).contains(&self.width)
            && (1..MAX_DIMENSION).contains(&self.height.saturating_abs())
            && self.file_size > 0
    }
}

/// Whether a cluster starts with a BMP header.
///
/// Without `strict`, the "BM" magic is enough.
pub fn is_header(cluster: &[u8], strict: bool) -> bool {
    if !cluster.starts_with(b"BM") {
        return false;
    }
    if !strict {
        return true;
    }

    BmpHeader::from_slice(cluster)
        .map(|header| header.is_plausible())
        .unwrap_or(false)
}

/// Whether a cluster looks like 24-bit pixel rows.
///
/// Counts adjacent BGR triples whose summed channel difference is below the smoothness threshold.
/// All-zero clusters qualify, black regions are common inside images.
pub fn looks_like_pixels(cluster: &[u8]) -> bool {
    let pixels: Vec<&[u8]> = cluster.chunks_exact(3).collect();
    let pairs = pixels.len().saturating_sub(1);
    if pairs == 0 {
        return false;
    }

    let smooth = pixels
        .windows(2)
        .filter(|pair| {
            let diff: u32 = pair[0]
                .iter()
                .zip(pair[1])
                .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs())
                .sum();
            diff < SMOOTHNESS_THRESHOLD
        })
        .count();

    smooth * SMOOTH_PAIR_RATIO > pairs
}

/// Builds a 24-bit bottom-up BMP filled with a smooth colour gradient.
///
/// `seed` shifts the colours so that two images of the same size differ.
pub fn gradient(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let stride = (width as usize * 3).div_ceil(4) * 4;
    let file_size = BMP_HEADER_SIZE + stride * height as usize;

    let mut out = Vec::with_capacity(file_size);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(BMP_HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&24u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&((stride * height as usize) as u32).to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&[0; 8]);

    for y in 0..height {
        let row_start = out.len();
        for x in 0..width {
            let b = (x / 4) as u8;
            let g = (y / 4) as u8;
            let r = ((x + y) / 8) as u8;
            out.extend_from_slice(&[b.wrapping_add(seed), g, r.wrapping_add(seed / 2)]);
        }
        out.resize(row_start + stride, 0);
    }

    out
}
