//! GCR flux images (G64, G71): the raw bit cells of each half-track as read
//! from the media, decoded to sectors on demand.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use log::{debug, info, trace, warn};

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::dxx::RawSectorImage;
use crate::disk::error::DiskError;
use crate::disk::gcr::{self, GcrWriter};
use crate::disk::image::Image;
use crate::disk::layout::{layout_by_media_type, MediaType};
use crate::disk::DiskImage;

pub const GCR_1541_SIGNATURE: &[u8] = b"GCR-1541";
pub const GCR_1571_SIGNATURE: &[u8] = b"GCR-1571";
const SIGNATURE_SIZE: usize = 8;
const VERSION_OFFSET: usize = 8;
const HALF_TRACK_COUNT_OFFSET: usize = 9;
const MAX_TRACK_SIZE_OFFSET: usize = 10;
const OFFSET_TABLE_OFFSET: usize = 12;

/// The track size conventionally declared by G64 writers.
const DEFAULT_MAX_TRACK_SIZE: u16 = 7928;
/// Half-tracks in a container built from a 1541 image (up to track 42).
const HALF_TRACKS_1541: usize = 84;

/// GCR decoding options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcrOptions {
    /// Drop data blocks whose checksum doesn't match their payload.  Off by
    /// default, since copy-protected disks often carry deliberately bad
    /// checksums on sectors that are still meant to be read.
    pub verify_data_checksum: bool,
}

impl GcrOptions {
    pub fn new() -> GcrOptions {
        GcrOptions::default()
    }

    pub fn with_verify_data_checksum(mut self, verify: bool) -> GcrOptions {
        self.verify_data_checksum = verify;
        self
    }
}

/// Sectors decoded from a half-track, along with the disk ID from the
/// first header found.
#[derive(Debug)]
pub struct DecodedTrack {
    pub id: [u8; 2],
    pub sectors: BTreeMap<u8, [u8; BLOCK_SIZE]>,
}

/// Decoding state of a half-track.
#[derive(Debug)]
enum HalfTrack {
    /// The offset table has no data for this half-track.
    NoData,
    NotRead,
    Sectors(DecodedTrack),
    /// The data is out of bounds, or no sector could be decoded from it.
    Error,
}

/// Return true if the bytes begin with a G64 or G71 signature.
pub fn is_gcr_image(bytes: &[u8]) -> bool {
    media_type_of(bytes).is_some()
}

fn media_type_of(bytes: &[u8]) -> Option<MediaType> {
    match bytes.get(..SIGNATURE_SIZE)? {
        s if s == GCR_1541_SIGNATURE => Some(MediaType::FiveInchSingleSided),
        s if s == GCR_1571_SIGNATURE => Some(MediaType::FiveInchDoubleSided),
        _ => None,
    }
}

#[inline]
fn u16_at(bytes: &[u8], offset: usize) -> Option<u16> {
    let b = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    let b = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub struct GcrImage {
    image: Image,
    media_type: MediaType,
    version: u8,
    max_track_size: u16,
    offsets: Vec<u32>,
    half_tracks: RefCell<Vec<HalfTrack>>,
    options: GcrOptions,
}

impl GcrImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Option<GcrImage> {
        GcrImage::from_bytes_with_options(bytes, GcrOptions::default())
    }

    pub fn from_bytes_with_options(bytes: Vec<u8>, options: GcrOptions) -> Option<GcrImage> {
        GcrImage::from_image(Image::from_vec(bytes), options)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<GcrImage> {
        GcrImage::open_with_options(path, GcrOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: GcrOptions) -> io::Result<GcrImage> {
        let image = Image::open(path.as_ref())?;
        match GcrImage::from_image(image, options) {
            Some(image) => {
                info!(
                    "opened {} as {} GCR image ({} half-tracks)",
                    path.as_ref().display(),
                    image.media_type,
                    image.half_track_count()
                );
                Ok(image)
            }
            None => Err(DiskError::UnknownFormat.into()),
        }
    }

    fn from_image(image: Image, options: GcrOptions) -> Option<GcrImage> {
        let bytes = image.as_slice();
        let media_type = match media_type_of(bytes) {
            Some(media_type) => media_type,
            None => {
                debug!("no GCR signature");
                return None;
            }
        };
        let version = *bytes.get(VERSION_OFFSET)?;
        let count = *bytes.get(HALF_TRACK_COUNT_OFFSET)? as usize;
        let max_track_size = u16_at(bytes, MAX_TRACK_SIZE_OFFSET)?;
        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            match u32_at(bytes, OFFSET_TABLE_OFFSET + i * 4) {
                Some(offset) => offsets.push(offset),
                None => {
                    debug!("GCR offset table truncated at half-track {}", i);
                    return None;
                }
            }
        }
        let half_tracks = offsets
            .iter()
            .map(|&offset| {
                if offset == 0 {
                    HalfTrack::NoData
                } else {
                    HalfTrack::NotRead
                }
            })
            .collect();
        Some(GcrImage {
            image,
            media_type,
            version,
            max_track_size,
            offsets,
            half_tracks: RefCell::new(half_tracks),
            options,
        })
    }

    /// Encode a 5.25" sector image as flux, as a drive with a freshly
    /// written disk would record it.
    pub fn from_sector_image(disk: &RawSectorImage) -> Option<GcrImage> {
        let bytes = build_container(disk)?;
        GcrImage::from_bytes(bytes)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn half_track_count(&self) -> usize {
        self.offsets.len()
    }

    /// The largest track size declared by the header.  Informational only.
    pub fn max_track_size(&self) -> u16 {
        self.max_track_size
    }

    pub fn options(&self) -> GcrOptions {
        self.options
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_slice()
    }

    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        self.image.save_as(path)
    }

    /// The flux bytes of a half-track, if its offset and length lie within
    /// the image.
    fn flux(&self, index: usize) -> Option<&[u8]> {
        let offset = *self.offsets.get(index)? as usize;
        let length = match u16_at(self.image.as_slice(), offset) {
            Some(length) => length as usize,
            None => {
                warn!("half-track {} offset {:#x} is out of bounds", index, offset);
                return None;
            }
        };
        let flux = self.image.slice(offset + 2, length);
        if flux.is_none() {
            warn!(
                "half-track {} data ({} bytes at {:#x}) runs past the end of the image",
                index, length, offset
            );
        }
        flux
    }

    fn decode(&self, index: usize) -> HalfTrack {
        let flux = match self.flux(index) {
            Some(flux) => flux,
            None => return HalfTrack::Error,
        };
        let mut decoded: Option<DecodedTrack> = None;
        for (header, payload) in gcr::decode_track(flux, self.options.verify_data_checksum) {
            let track = decoded.get_or_insert_with(|| DecodedTrack {
                id: header.id,
                sectors: BTreeMap::new(),
            });
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&payload);
            // Keep the first copy of a sector that is recorded twice.
            track.sectors.entry(header.sector).or_insert(block);
        }
        match decoded {
            Some(track) => {
                trace!("half-track {}: {} sectors", index, track.sectors.len());
                HalfTrack::Sectors(track)
            }
            None => {
                debug!("half-track {}: no sectors decoded", index);
                HalfTrack::Error
            }
        }
    }

    /// Run `f` on the decoded sectors of a track, decoding it on first use.
    fn with_track<T, F>(&self, track: u8, f: F) -> Option<T>
    where
        F: FnOnce(&DecodedTrack) -> Option<T>,
    {
        if track == 0 || track > self.track_count() {
            return None;
        }
        let index = (track as usize - 1) * 2;
        let needs_decode = matches!(self.half_tracks.borrow().get(index)?, HalfTrack::NotRead);
        if needs_decode {
            let decoded = self.decode(index);
            self.half_tracks.borrow_mut()[index] = decoded;
        }
        match self.half_tracks.borrow().get(index)? {
            HalfTrack::Sectors(decoded) => f(decoded),
            HalfTrack::NoData | HalfTrack::NotRead | HalfTrack::Error => None,
        }
    }

    /// The ID recorded in the sector headers of the directory track.  This
    /// can differ from the ID in the header block, which is what `disk_id()`
    /// reports.
    pub fn header_id(&self) -> Option<[u8; 2]> {
        self.with_track(self.directory_track(), |t| Some(t.id))
    }

    /// The number of sectors that could be decoded from a track.
    pub fn decoded_sectors(&self, track: u8) -> usize {
        self.with_track(track, |t| Some(t.sectors.len())).unwrap_or(0)
    }
}

impl DiskImage for GcrImage {
    fn get_block(&self, track: u8, sector: u8) -> Option<Vec<u8>> {
        if sector >= self.sectors_in_track(track) {
            return None;
        }
        self.with_track(track, |t| t.sectors.get(&sector).map(|b| b.to_vec()))
    }

    /// Flux images are read-only.
    fn write_block(&mut self, track: u8, sector: u8, _data: &[u8]) -> bool {
        debug!("ignoring write to {} of a GCR image", Location(track, sector));
        false
    }

    fn directory_track(&self) -> u8 {
        18
    }

    fn directory_sector(&self) -> u8 {
        1
    }

    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn track_count(&self) -> u8 {
        ((self.offsets.len() + 1) / 2) as u8
    }

    fn sectors_in_track(&self, track: u8) -> u8 {
        if track == 0 || track > self.track_count() {
            return 0;
        }
        layout_by_media_type(self.media_type)
            .map(|layout| layout.template.zone_sectors(track))
            .unwrap_or(0)
    }

    /// Write the flux data back verbatim.
    fn save(&self) -> io::Result<()> {
        self.image.save()
    }
}

/// Speed zone of a track as recorded in the G64 speed table: 3 is the
/// fastest bit rate (tracks 1-17), 0 the slowest (31 and up).
fn speed_zone(track: u8) -> u32 {
    let track = if track > 35 { track - 35 } else { track };
    match track {
        0..=17 => 3,
        18..=24 => 2,
        25..=30 => 1,
        _ => 0,
    }
}

/// Build a G64 (or G71) container holding every sector of a 5.25" image.
fn build_container(disk: &RawSectorImage) -> Option<Vec<u8>> {
    let (signature, half_tracks) = match disk.media_type() {
        MediaType::FiveInchSingleSided => (GCR_1541_SIGNATURE, HALF_TRACKS_1541),
        MediaType::FiveInchDoubleSided => (GCR_1571_SIGNATURE, disk.track_count() as usize * 2),
        _ => return None,
    };
    let id = disk.disk_id().unwrap_or([0xA0, 0xA0]);

    let mut tracks = vec![];
    for track in 1..=disk.track_count() {
        let mut writer = GcrWriter::new();
        for sector in 0..disk.sectors_in_track(track) {
            writer.write_sector(track, sector, id, disk.block(track, sector)?);
        }
        tracks.push(writer.into_bytes());
    }
    let max_track_size = tracks
        .iter()
        .map(|t| t.len())
        .max()
        .unwrap_or(0)
        .max(DEFAULT_MAX_TRACK_SIZE as usize);

    let tables = OFFSET_TABLE_OFFSET + half_tracks * 8;
    let mut bytes = vec![0u8; tables];
    bytes[..SIGNATURE_SIZE].copy_from_slice(signature);
    bytes[VERSION_OFFSET] = 0;
    bytes[HALF_TRACK_COUNT_OFFSET] = half_tracks as u8;
    bytes[MAX_TRACK_SIZE_OFFSET..MAX_TRACK_SIZE_OFFSET + 2]
        .copy_from_slice(&(max_track_size as u16).to_le_bytes());
    for (i, flux) in tracks.iter().enumerate() {
        let half_track = i * 2;
        let offset = bytes.len() as u32;
        let entry = OFFSET_TABLE_OFFSET + half_track * 4;
        bytes[entry..entry + 4].copy_from_slice(&offset.to_le_bytes());
        let speed = OFFSET_TABLE_OFFSET + (half_tracks + half_track) * 4;
        bytes[speed..speed + 4].copy_from_slice(&speed_zone(i as u8 + 1).to_le_bytes());

        bytes.extend_from_slice(&(flux.len() as u16).to_le_bytes());
        bytes.extend_from_slice(flux);
        // Each track slot is the full declared size.
        bytes.resize(bytes.len() + max_track_size - flux.len(), 0);
    }
    Some(bytes)
}
