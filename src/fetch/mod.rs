// src/fetch/mod.rs

pub mod download;
pub mod urls;

pub use download::{stage, Staged};

use flate2::bufread::MultiGzDecoder;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::Path,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER: usize = 256 * 1024;

/// Wrap `reader` in a gzip decoder if its first bytes are the gzip magic.
pub fn decompressed<R>(mut reader: R) -> io::Result<Box<dyn Read + Send>>
where
    R: BufRead + Send + 'static,
{
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if gzipped {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Open a staged source file for streaming, gunzipping it when needed.
pub fn open_decompressed(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    decompressed(BufReader::with_capacity(READ_BUFFER, file))
}
