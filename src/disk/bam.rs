//! The Block Availability Map (BAM): free block counting, and the BAM
//! templates used to format blank images.

use log::debug;

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::layout::{DiskLayout, MediaType};
use crate::disk::DiskImage;

/// A BamFormat describes how BAM information is stored for a particular disk
/// image format.
pub struct BamFormat {
    /// The list of sections where BAM entries are stored.
    pub sections: &'static [BamSection],
    /// A track that is never available for files besides the directory
    /// track, or 0 if there is none.  The 1571 uses track 53 for the
    /// second side's BAM and wastes the rest of it.
    pub reserved_track: u8,
}

/// BAM can be stored in one or more sections, depending on the disk image
/// format. Each section stores BAM entries for a particular range of tracks.
pub struct BamSection {
    /// The first track described by this section.
    pub first_track: u8,
    /// The total number of tracks (and hence entries) in this section.
    pub tracks: u8,
    /// The track and sector where this section's bitmaps are stored.
    pub bitmap_location: Location,
    /// The offset within the block where entries start.
    pub bitmap_offset: usize,
    /// The size in bytes of the bitmap.  (E.g. 3 in 1541 BAM entries.)
    pub bitmap_size: usize,
    /// How many bytes apart are the BAM bitmap entries?  (E.g., on 1541 BAM,
    /// this 4 -- one more than the bitmap_size, since we skip over the
    /// free sectors byte when reading the bitmap.)
    pub bitmap_stride: usize,
    /// The track and sector where this section's free sector counts are stored.
    pub free_location: Location,
    /// The offset within the block where entries start.
    pub free_offset: usize,
    /// How many bytes apart are the free sector counts?
    pub free_stride: usize,
}

impl BamSection {
    #[inline]
    fn free_byte(&self, track: u8) -> usize {
        self.free_offset + (track - self.first_track) as usize * self.free_stride
    }

    #[inline]
    fn bitmap_range(&self, track: u8) -> std::ops::Range<usize> {
        let start = self.bitmap_offset + (track - self.first_track) as usize * self.bitmap_stride;
        start..start + self.bitmap_size
    }
}

const SECTION_1541: BamSection = BamSection {
    first_track: 1,
    tracks: 35,
    bitmap_location: Location(18, 0),
    bitmap_offset: 0x05,
    bitmap_size: 3,
    bitmap_stride: 4,
    free_location: Location(18, 0),
    free_offset: 0x04,
    free_stride: 4,
};

static BAM_FORMAT_1541: BamFormat = BamFormat {
    sections: &[SECTION_1541],
    reserved_track: 0,
};

/// The 1571 keeps the second side's free counts at the end of the 1541 BAM
/// block, and its bitmaps on track 53.
static BAM_FORMAT_1571: BamFormat = BamFormat {
    sections: &[
        SECTION_1541,
        BamSection {
            first_track: 36,
            tracks: 35,
            bitmap_location: Location(53, 0),
            bitmap_offset: 0x00,
            bitmap_size: 3,
            bitmap_stride: 3,
            free_location: Location(18, 0),
            free_offset: 0xDD,
            free_stride: 1,
        },
    ],
    reserved_track: 53,
};

static BAM_FORMAT_1581: BamFormat = BamFormat {
    sections: &[
        BamSection {
            first_track: 1,
            tracks: 40,
            bitmap_location: Location(40, 1),
            bitmap_offset: 0x11,
            bitmap_size: 5,
            bitmap_stride: 6,
            free_location: Location(40, 1),
            free_offset: 0x10,
            free_stride: 6,
        },
        BamSection {
            first_track: 41,
            tracks: 40,
            bitmap_location: Location(40, 2),
            bitmap_offset: 0x11,
            bitmap_size: 5,
            bitmap_stride: 6,
            free_location: Location(40, 2),
            free_offset: 0x10,
            free_stride: 6,
        },
    ],
    reserved_track: 0,
};

impl BamFormat {
    /// The BAM format for a media type.  Free space on 8050/8250 and CMD
    /// media is not interpreted.
    pub fn for_media(media_type: MediaType) -> Option<&'static BamFormat> {
        match media_type {
            MediaType::FiveInchSingleSided => Some(&BAM_FORMAT_1541),
            MediaType::FiveInchDoubleSided => Some(&BAM_FORMAT_1571),
            MediaType::ThreeInchDoubleDensity => Some(&BAM_FORMAT_1581),
            _ => None,
        }
    }
}

/// Return the free sector count of each track covered by the BAM, as
/// `(track, free)` pairs.  Tracks beyond those the BAM describes (e.g. 36-40
/// on a 40-track D64) are not included.
pub fn free_counts<D: DiskImage + ?Sized>(disk: &D) -> Option<Vec<(u8, u8)>> {
    let format = BamFormat::for_media(disk.media_type())?;
    let mut counts = vec![];
    for section in format.sections {
        let block = match disk.get_block(section.free_location.0, section.free_location.1) {
            Some(block) => block,
            None => {
                debug!("BAM block {} is unreadable", section.free_location);
                return None;
            }
        };
        let last = (section.first_track + section.tracks - 1).min(disk.track_count());
        for track in section.first_track..=last {
            counts.push((track, block[section.free_byte(track)]));
        }
    }
    Some(counts)
}

/// Count the free blocks available for files.  The directory track (and
/// any reserved track) is excluded, as CBM DOS does for its "blocks free"
/// line.
pub fn blocks_free<D: DiskImage + ?Sized>(disk: &D) -> Option<usize> {
    let format = BamFormat::for_media(disk.media_type())?;
    let directory_track = disk.directory_track();
    let counts = free_counts(disk)?;
    Some(
        counts
            .iter()
            .filter(|(track, _)| *track != directory_track && *track != format.reserved_track)
            .map(|(_, free)| *free as usize)
            .sum(),
    )
}

/// A fixed run of bytes in a BAM template.
pub struct Patch {
    pub location: Location,
    pub offset: usize,
    pub bytes: &'static [u8],
}

/// The bytes CBM DOS writes to the header and BAM blocks when formatting,
/// apart from the per-track BAM entries, which are computed from the layout.
pub struct BamTemplate {
    pub header: Location,
    pub patches: &'static [Patch],
    /// Additional places the two-byte disk ID is recorded.
    pub id_copies: &'static [(Location, usize)],
    /// Blocks allocated on a freshly formatted disk, besides those on the
    /// reserved track.
    pub system_locations: &'static [Location],
    pub bam: &'static BamFormat,
}

#[rustfmt::skip]
static PATCHES_1541: [Patch; 3] = [
    // Directory link, DOS version 'A', single sided.
    Patch { location: Location(18, 0), offset: 0x00, bytes: &[18, 1, 0x41, 0x00] },
    // Disk name.
    Patch { location: Location(18, 0), offset: 0x90, bytes: &[0xA0; 16] },
    // Padding, ID, padding, DOS type "2A", padding.
    Patch { location: Location(18, 0), offset: 0xA0, bytes: &[
        0xA0, 0xA0, 0xA0, 0xA0, 0xA0, 0x32, 0x41, 0xA0, 0xA0, 0xA0, 0xA0,
    ] },
];

#[rustfmt::skip]
static PATCHES_1571: [Patch; 3] = [
    // As the 1541, but with the double-sided flag.
    Patch { location: Location(18, 0), offset: 0x00, bytes: &[18, 1, 0x41, 0x80] },
    Patch { location: Location(18, 0), offset: 0x90, bytes: &[0xA0; 16] },
    Patch { location: Location(18, 0), offset: 0xA0, bytes: &[
        0xA0, 0xA0, 0xA0, 0xA0, 0xA0, 0x32, 0x41, 0xA0, 0xA0, 0xA0, 0xA0,
    ] },
];

#[rustfmt::skip]
static PATCHES_1581: [Patch; 5] = [
    // Directory link, DOS version 'D'.
    Patch { location: Location(40, 0), offset: 0x00, bytes: &[40, 3, 0x44, 0x00] },
    Patch { location: Location(40, 0), offset: 0x04, bytes: &[0xA0; 16] },
    // Padding, ID, padding, DOS type "3D", padding.
    Patch { location: Location(40, 0), offset: 0x14, bytes: &[
        0xA0, 0xA0, 0xA0, 0xA0, 0xA0, 0x33, 0x44, 0xA0, 0xA0,
    ] },
    // Link to the second BAM block, version 'D' and its complement, ID
    // placeholder, I/O byte, auto-boot flag.
    Patch { location: Location(40, 1), offset: 0x00, bytes: &[
        40, 2, 0x44, 0xBB, 0x00, 0x00, 0xC0, 0x00,
    ] },
    Patch { location: Location(40, 2), offset: 0x00, bytes: &[
        0x00, 0xFF, 0x44, 0xBB, 0x00, 0x00, 0xC0, 0x00,
    ] },
];

static TEMPLATE_1541: BamTemplate = BamTemplate {
    header: Location(18, 0),
    patches: &PATCHES_1541,
    id_copies: &[],
    system_locations: &[Location(18, 0), Location(18, 1)],
    bam: &BAM_FORMAT_1541,
};

static TEMPLATE_1571: BamTemplate = BamTemplate {
    header: Location(18, 0),
    patches: &PATCHES_1571,
    id_copies: &[],
    system_locations: &[Location(18, 0), Location(18, 1)],
    bam: &BAM_FORMAT_1571,
};

static TEMPLATE_1581: BamTemplate = BamTemplate {
    header: Location(40, 0),
    patches: &PATCHES_1581,
    id_copies: &[(Location(40, 1), 0x04), (Location(40, 2), 0x04)],
    system_locations: &[
        Location(40, 0),
        Location(40, 1),
        Location(40, 2),
        Location(40, 3),
    ],
    bam: &BAM_FORMAT_1581,
};

impl BamTemplate {
    /// The formatting template for a media type.  Only the 1541-style
    /// (including the 1571) and 1581-style layouts can be formatted.
    pub fn for_media(media_type: MediaType) -> Option<&'static BamTemplate> {
        match media_type {
            MediaType::FiveInchSingleSided => Some(&TEMPLATE_1541),
            MediaType::FiveInchDoubleSided => Some(&TEMPLATE_1571),
            MediaType::ThreeInchDoubleDensity => Some(&TEMPLATE_1581),
            _ => None,
        }
    }

    fn is_allocated(&self, location: Location) -> bool {
        location.0 == self.bam.reserved_track || self.system_locations.contains(&location)
    }

    /// Render the header and BAM blocks of a blank disk with this layout.
    /// The returned blocks still need the disk name and ID patched in.
    pub fn render(&self, layout: &DiskLayout) -> Vec<(Location, Vec<u8>)> {
        let mut blocks: Vec<(Location, Vec<u8>)> = vec![];
        fn block_mut(blocks: &mut Vec<(Location, Vec<u8>)>, location: Location) -> &mut Vec<u8> {
            let index = match blocks.iter().position(|(l, _)| *l == location) {
                Some(index) => index,
                None => {
                    blocks.push((location, vec![0u8; BLOCK_SIZE]));
                    blocks.len() - 1
                }
            };
            &mut blocks[index].1
        }

        block_mut(&mut blocks, self.header);
        for patch in self.patches {
            let block = block_mut(&mut blocks, patch.location);
            block[patch.offset..patch.offset + patch.bytes.len()].copy_from_slice(patch.bytes);
        }

        for section in self.bam.sections {
            for track in section.first_track..section.first_track + section.tracks {
                let sectors = layout.sectors_in_track(track);
                let mut bitmap = 0u64;
                for sector in 0..sectors {
                    if !self.is_allocated(Location(track, sector)) {
                        bitmap |= 1 << sector;
                    }
                }
                let free = bitmap.count_ones() as u8;

                let block = block_mut(&mut blocks, section.free_location);
                block[section.free_byte(track)] = free;
                let block = block_mut(&mut blocks, section.bitmap_location);
                for (i, offset) in section.bitmap_range(track).enumerate() {
                    block[offset] = (bitmap >> (i * 8)) as u8;
                }
            }
        }
        blocks
    }

    /// Record the two-byte disk ID in the BAM blocks that mirror it.
    pub fn write_id_copies(&self, blocks: &mut [(Location, Vec<u8>)], id: [u8; 2]) {
        for (location, offset) in self.id_copies {
            if let Some((_, block)) = blocks.iter_mut().find(|(l, _)| l == location) {
                block[*offset..*offset + 2].copy_from_slice(&id);
            }
        }
    }
}
