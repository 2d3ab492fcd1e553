//! Traits, structs, and functions relating to disk images.

pub mod bam;
pub mod bitstream;
pub mod block;
pub mod chain;
pub mod directory;
pub mod gcr;
pub mod layout;

mod dxx;
mod error;
mod gxx;
mod header;
mod image;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::debug;

use crate::disk::header::HeaderFormat;
use crate::petscii::Petscii;

pub use self::block::{Location, BLOCK_SIZE};
pub use self::directory::{Directory, Entry, FileType};
pub use self::dxx::RawSectorImage;
pub use self::error::DiskError;
pub use self::gxx::{is_gcr_image, GcrImage, GcrOptions};
pub use self::layout::{layout_by_media_type, layout_by_size, DiskLayout, MediaType};

/// The two families of disk image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    /// Raw sector dumps: D64, D71, D81, D80, D82, D1M, D2M, D4M.
    Dxx,
    /// GCR flux images: G64, G71.
    Gxx,
}

fn extension<P: AsRef<Path>>(path: P) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

impl ImageKind {
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<ImageKind> {
        match &extension(path)?[..] {
            "d64" | "d71" | "d81" | "d80" | "d82" | "d1m" | "d2m" | "d4m" => Some(ImageKind::Dxx),
            "g64" | "g71" => Some(ImageKind::Gxx),
            _ => None,
        }
    }
}

/// The media type conventionally associated with a file extension.
pub fn media_type_from_extension<P: AsRef<Path>>(path: P) -> Option<MediaType> {
    match &extension(path)?[..] {
        "d64" | "g64" => Some(MediaType::FiveInchSingleSided),
        "d71" | "g71" => Some(MediaType::FiveInchDoubleSided),
        "d81" | "d1m" => Some(MediaType::ThreeInchDoubleDensity),
        "d2m" => Some(MediaType::ThreeInchHighDensity),
        "d4m" => Some(MediaType::ThreeInchExtendedDensity),
        "d80" => Some(MediaType::EightInchSingleSided),
        "d82" => Some(MediaType::EightInchDoubleSided),
        _ => None,
    }
}

/// Interpret a buffer as a disk image: a GCR image if it carries a GCR
/// signature, otherwise a sector image if its size matches a known layout.
pub fn from_bytes(bytes: Vec<u8>) -> Option<Box<dyn DiskImage>> {
    from_bytes_with_options(bytes, GcrOptions::default())
}

pub fn from_bytes_with_options(bytes: Vec<u8>, options: GcrOptions) -> Option<Box<dyn DiskImage>> {
    if is_gcr_image(&bytes) {
        GcrImage::from_bytes_with_options(bytes, options).map(|d| Box::new(d) as Box<dyn DiskImage>)
    } else {
        RawSectorImage::from_bytes(bytes).map(|d| Box::new(d) as Box<dyn DiskImage>)
    }
}

/// Open a disk image file, identified the same way as `from_bytes()`.
/// The file itself is only modified by an explicit `save()`.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn DiskImage>> {
    open_with_options(path, GcrOptions::default())
}

pub fn open_with_options<P: AsRef<Path>>(
    path: P,
    options: GcrOptions,
) -> io::Result<Box<dyn DiskImage>> {
    let path = path.as_ref();
    let mut signature = Vec::with_capacity(8);
    File::open(path)?.take(8).read_to_end(&mut signature)?;
    if is_gcr_image(&signature) {
        return Ok(Box::new(GcrImage::open_with_options(path, options)?));
    }
    match RawSectorImage::open(path) {
        Ok(disk) => Ok(Box::new(disk)),
        Err(ref e) if DiskError::from_io_error(e) == Some(DiskError::InvalidLayout) => {
            debug!("{}: neither a GCR image nor a known sector image size", path.display());
            Err(DiskError::UnknownFormat.into())
        }
        Err(e) => Err(e),
    }
}

/// Block access common to every kind of disk image, and the CBM DOS
/// structures reconstructed from it.
///
/// Blocks are addressed by track (starting at 1) and sector (starting at
/// 0).  Addresses that don't exist on the media, and blocks that can't be
/// decoded, are reported as `None` rather than as errors; the directory and
/// file algorithms treat them as the end of the chain they were following.
pub trait DiskImage {
    /// A copy of one 256-byte block.
    fn get_block(&self, track: u8, sector: u8) -> Option<Vec<u8>>;

    /// Replace one block.  Returns false, leaving the image untouched, if
    /// the block doesn't exist, the data isn't exactly one block long, or
    /// the image can't be written.
    fn write_block(&mut self, track: u8, sector: u8, data: &[u8]) -> bool;

    fn directory_track(&self) -> u8;

    fn directory_sector(&self) -> u8;

    fn media_type(&self) -> MediaType;

    fn track_count(&self) -> u8;

    /// Sectors on a track, or 0 if the track doesn't exist.
    fn sectors_in_track(&self, track: u8) -> u8;

    /// Write the image back to the file it was opened from.  Images built
    /// in memory have nowhere to go, and saving them does nothing.
    fn save(&self) -> io::Result<()>;

    /// The two-byte disk ID from the header block, for 5.25" and 3.5"
    /// double density media.
    fn disk_id(&self) -> Option<[u8; 2]> {
        let format = match self.media_type() {
            MediaType::FiveInchSingleSided
            | MediaType::FiveInchDoubleSided
            | MediaType::ThreeInchDoubleDensity => HeaderFormat::for_media(self.media_type())?,
            _ => return None,
        };
        let block = self.get_block(self.directory_track(), 0)?;
        Some(format.disk_id(&block))
    }

    fn read_directory(&self) -> Directory {
        directory::read_directory(self)
    }

    /// The "blocks free" count from the BAM, if this media's BAM is
    /// understood and readable.
    fn read_free_blocks(&self) -> Option<usize> {
        bam::blocks_free(self)
    }

    /// The contents of the file whose chain starts at the given block, or
    /// `None` if the chain loops or runs into a block that can't be read.
    fn read_file(&self, track: u8, sector: u8) -> Option<Vec<u8>> {
        match chain::read_chain(self, Location(track, sector)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("cannot read file at {}: {}", Location(track, sector), e);
                None
            }
        }
    }

    fn read_entry(&self, entry: &Entry) -> Option<Vec<u8>> {
        self.read_file(entry.start.0, entry.start.1)
    }

    /// The first directory entry with the given name.
    fn find_entry(&self, name: &Petscii) -> Option<Entry> {
        self.read_directory().find(name).cloned()
    }
}
