//! Raw sector images (D64, D71, D81, D80, D82, and the CMD D1M/D2M/D4M):
//! every sector of the disk stored back to back in track order, optionally
//! followed by a table of one error code per sector.

use std::io;
use std::path::Path;

use log::{debug, info};

use crate::disk::bam::BamTemplate;
use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::error::DiskError;
use crate::disk::header::HeaderFormat;
use crate::disk::image::Image;
use crate::disk::layout::{layout_by_media_type, layout_by_size, DiskLayout, MediaType};
use crate::disk::DiskImage;
use crate::petscii::Petscii;

pub struct RawSectorImage {
    image: Image,
    layout: &'static DiskLayout,
}

impl RawSectorImage {
    /// Interpret a buffer as a sector image.  Its size must match a known
    /// layout exactly.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<RawSectorImage> {
        let layout = match layout_by_size(bytes.len()) {
            Some(layout) => layout,
            None => {
                debug!("no sector image layout is {} bytes", bytes.len());
                return None;
            }
        };
        Some(RawSectorImage {
            image: Image::from_vec(bytes),
            layout,
        })
    }

    /// Open a sector image file.  Changes stay in memory until `save()`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<RawSectorImage> {
        let image = Image::open(path.as_ref())?;
        let layout = match layout_by_size(image.len()) {
            Some(layout) => layout,
            None => {
                debug!(
                    "{}: no sector image layout is {} bytes",
                    path.as_ref().display(),
                    image.len()
                );
                return Err(DiskError::InvalidLayout.into());
            }
        };
        info!("opened {} as {:?}", path.as_ref().display(), layout);
        Ok(RawSectorImage { image, layout })
    }

    /// Create a blank, formatted image: the header and BAM for an empty
    /// disk, and an empty directory.  Only 5.25" and 3.5" double density
    /// media can be formatted.
    pub fn create(media_type: MediaType, name: &Petscii, id: &Petscii) -> Option<RawSectorImage> {
        let layout = layout_by_media_type(media_type)?;
        let template = BamTemplate::for_media(media_type)?;
        let header_format = HeaderFormat::for_media(media_type)?;

        let mut blocks = template.render(layout);
        if let Some((_, header)) = blocks.iter_mut().find(|(l, _)| *l == template.header) {
            header_format.write_name_and_id(header, name, id);
        }
        let mut disk_id = [0xA0u8; 2];
        for (dst, src) in disk_id.iter_mut().zip(id.as_bytes()) {
            *dst = *src;
        }
        template.write_id_copies(&mut blocks, disk_id);

        let mut image = RawSectorImage {
            image: Image::open_memory(layout.file_size()),
            layout,
        };
        for (location, block) in &blocks {
            if !image.write_block(location.0, location.1, block) {
                return None;
            }
        }

        // The first directory block: end of chain, every entry slot free.
        let mut directory = [0u8; BLOCK_SIZE];
        directory[1] = 0xFF;
        if !image.write_block(layout.directory_track, layout.directory_sector, &directory) {
            return None;
        }
        info!("created blank {:?} \"{}\"", layout, name);
        Some(image)
    }

    pub fn layout(&self) -> &'static DiskLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_slice()
    }

    /// Borrow a block in place.
    pub fn block(&self, track: u8, sector: u8) -> Option<&[u8]> {
        let offset = self.layout.offset(track, sector)?;
        self.image.slice(offset, BLOCK_SIZE)
    }

    fn block_mut(&mut self, track: u8, sector: u8) -> Option<&mut [u8]> {
        let offset = self.layout.offset(track, sector)?;
        self.image.slice_mut(offset, BLOCK_SIZE)
    }

    /// The error table, one byte per sector in track order, if the image
    /// has one.
    pub fn error_map(&self) -> Option<&[u8]> {
        let offset = self.layout.error_map_offset()?;
        self.image.slice(offset, self.layout.total_sectors)
    }

    /// The error code recorded for a sector.  By convention 1 means no
    /// error; 0 is also used to mean the same.
    pub fn sector_error(&self, track: u8, sector: u8) -> Option<u8> {
        let index = self.layout.sector_index(track, sector)?;
        self.error_map()?.get(index).copied()
    }

    /// Write the image somewhere other than where it was loaded from.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        self.image.save_as(path)
    }
}

impl DiskImage for RawSectorImage {
    fn get_block(&self, track: u8, sector: u8) -> Option<Vec<u8>> {
        self.block(track, sector).map(|block| block.to_vec())
    }

    fn write_block(&mut self, track: u8, sector: u8, data: &[u8]) -> bool {
        if data.len() != BLOCK_SIZE {
            debug!(
                "ignoring {}-byte write to {}",
                data.len(),
                Location(track, sector)
            );
            return false;
        }
        match self.block_mut(track, sector) {
            Some(block) => {
                block.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    fn directory_track(&self) -> u8 {
        self.layout.directory_track
    }

    fn directory_sector(&self) -> u8 {
        self.layout.directory_sector
    }

    fn media_type(&self) -> MediaType {
        self.layout.media_type
    }

    fn track_count(&self) -> u8 {
        self.layout.track_count
    }

    fn sectors_in_track(&self, track: u8) -> u8 {
        self.layout.sectors_in_track(track)
    }

    fn save(&self) -> io::Result<()> {
        self.image.save()
    }
}
