//! The geometry catalog: physical track and sector layouts of the supported
//! drives, and the lookup tables that identify a sector image from its size.
//!
//! Sector counts per track follow the CBM DOS speed zones.  For example, the
//! 1541 records 21 sectors on tracks 1-17, 19 on 18-24, 18 on 25-30, and 17
//! on 31 and above.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::disk::block::BLOCK_SIZE;

/// The abstract kind of media an image represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// 5.25" single sided (1541, D64/G64)
    FiveInchSingleSided,
    /// 5.25" double sided (1571, D71/G71)
    FiveInchDoubleSided,
    /// 3.5" double density (1581, D81, CMD D1M)
    ThreeInchDoubleDensity,
    /// 3.5" high density (CMD FD2000, D2M)
    ThreeInchHighDensity,
    /// 3.5" extended density (CMD FD4000, D4M)
    ThreeInchExtendedDensity,
    /// 8050 single sided (D80)
    EightInchSingleSided,
    /// 8250 double sided (D82)
    EightInchDoubleSided,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            MediaType::FiveInchSingleSided => "5.25\" single sided",
            MediaType::FiveInchDoubleSided => "5.25\" double sided",
            MediaType::ThreeInchDoubleDensity => "3.5\" double density",
            MediaType::ThreeInchHighDensity => "3.5\" high density",
            MediaType::ThreeInchExtendedDensity => "3.5\" extended density",
            MediaType::EightInchSingleSided => "8050 single sided",
            MediaType::EightInchDoubleSided => "8250 double sided",
        })
    }
}

/// A speed zone: from `first_track` upward, each track holds `sectors`
/// sectors until the next zone begins.
#[derive(Clone, Copy, Debug)]
pub struct Zone {
    pub first_track: u8,
    pub sectors: u8,
}

const fn zone(first_track: u8, sectors: u8) -> Zone {
    Zone {
        first_track,
        sectors,
    }
}

/// A drive's recording format, from which layouts of various track counts
/// are derived.
pub struct LayoutTemplate {
    pub name: &'static str,
    pub zones: &'static [Zone],
    /// Supported track counts.  The first is the canonical one used when
    /// creating blank images.
    pub track_counts: &'static [u8],
    pub directory_track: u8,
    pub directory_sector: u8,
    pub media_type: MediaType,
}

static ZONES_1541: [Zone; 4] = [zone(1, 21), zone(18, 19), zone(25, 18), zone(31, 17)];

#[rustfmt::skip]
static ZONES_1571: [Zone; 8] = [
    zone(1, 21), zone(18, 19), zone(25, 18), zone(31, 17),
    zone(36, 21), zone(53, 19), zone(60, 18), zone(66, 17),
];

static ZONES_8050: [Zone; 4] = [zone(1, 29), zone(40, 27), zone(54, 25), zone(65, 23)];

#[rustfmt::skip]
static ZONES_8250: [Zone; 8] = [
    zone(1, 29), zone(40, 27), zone(54, 25), zone(65, 23),
    zone(78, 29), zone(117, 27), zone(131, 25), zone(142, 23),
];

/// Every supported recording format, in lookup priority order.
pub static TEMPLATES: [LayoutTemplate; 7] = [
    LayoutTemplate {
        name: "1541",
        zones: &ZONES_1541,
        track_counts: &[35, 40, 42],
        directory_track: 18,
        directory_sector: 1,
        media_type: MediaType::FiveInchSingleSided,
    },
    LayoutTemplate {
        name: "1571",
        zones: &ZONES_1571,
        track_counts: &[70],
        directory_track: 18,
        directory_sector: 1,
        media_type: MediaType::FiveInchDoubleSided,
    },
    LayoutTemplate {
        name: "1581",
        zones: &[zone(1, 40)],
        track_counts: &[80, 81, 82, 83],
        directory_track: 40,
        directory_sector: 3,
        media_type: MediaType::ThreeInchDoubleDensity,
    },
    LayoutTemplate {
        name: "8050",
        zones: &ZONES_8050,
        track_counts: &[77],
        directory_track: 39,
        directory_sector: 1,
        media_type: MediaType::EightInchSingleSided,
    },
    LayoutTemplate {
        name: "8250",
        zones: &ZONES_8250,
        track_counts: &[154],
        directory_track: 39,
        directory_sector: 1,
        media_type: MediaType::EightInchDoubleSided,
    },
    // CMD native partitions keep their root directory on track 1 sector
    // 34.  (The D1M size coincides with the 81-track 1581 layout, which
    // takes precedence.)
    LayoutTemplate {
        name: "FD2000",
        zones: &[zone(1, 80)],
        track_counts: &[81],
        directory_track: 1,
        directory_sector: 34,
        media_type: MediaType::ThreeInchHighDensity,
    },
    LayoutTemplate {
        name: "FD4000",
        zones: &[zone(1, 160)],
        track_counts: &[81],
        directory_track: 1,
        directory_sector: 34,
        media_type: MediaType::ThreeInchExtendedDensity,
    },
];

impl LayoutTemplate {
    /// Sectors on `track` according to the zone table, ignoring the track
    /// count.  Track 0 has none.
    pub fn zone_sectors(&self, track: u8) -> u8 {
        self.zones
            .iter()
            .rev()
            .find(|z| z.first_track <= track)
            .map(|z| z.sectors)
            .unwrap_or(0)
    }
}

/// A concrete sector image layout.  Immutable once built; all instances
/// live in the process-wide catalog.
pub struct DiskLayout {
    pub template: &'static LayoutTemplate,
    pub track_count: u8,
    /// Byte offset of the first sector of each track.  Index 0 is a
    /// placeholder, since there is no track 0.
    pub track_offsets: Vec<usize>,
    pub total_sectors: usize,
    pub directory_track: u8,
    pub directory_sector: u8,
    pub media_type: MediaType,
    /// Whether an error table (one byte per sector) follows the sectors.
    pub has_error_map: bool,
}

impl DiskLayout {
    pub fn new(template: &'static LayoutTemplate, track_count: u8, has_error_map: bool) -> DiskLayout {
        let mut track_offsets = Vec::with_capacity(track_count as usize + 1);
        track_offsets.push(0);
        let mut total_sectors = 0usize;
        for track in 1..=track_count {
            track_offsets.push(total_sectors * BLOCK_SIZE);
            total_sectors += template.zone_sectors(track) as usize;
        }
        DiskLayout {
            template,
            track_count,
            track_offsets,
            total_sectors,
            directory_track: template.directory_track,
            directory_sector: template.directory_sector,
            media_type: template.media_type,
            has_error_map,
        }
    }

    /// The number of sectors on `track`, or 0 if there is no such track.
    #[inline]
    pub fn sectors_in_track(&self, track: u8) -> u8 {
        if track < 1 || track > self.track_count {
            return 0;
        }
        self.template.zone_sectors(track)
    }

    /// Byte offset of a sector, if it exists in this layout.
    pub fn offset(&self, track: u8, sector: u8) -> Option<usize> {
        if sector >= self.sectors_in_track(track) {
            return None;
        }
        Some(self.track_offsets[track as usize] + sector as usize * BLOCK_SIZE)
    }

    /// Index of a sector counting from track 1 sector 0, as used by the
    /// error table.
    pub fn sector_index(&self, track: u8, sector: u8) -> Option<usize> {
        self.offset(track, sector).map(|offset| offset / BLOCK_SIZE)
    }

    /// Offset of the error table, if this layout has one.
    pub fn error_map_offset(&self) -> Option<usize> {
        if self.has_error_map {
            Some(self.total_sectors * BLOCK_SIZE)
        } else {
            None
        }
    }

    /// Total image size in bytes.
    pub fn file_size(&self) -> usize {
        if self.has_error_map {
            self.total_sectors * (BLOCK_SIZE + 1)
        } else {
            self.total_sectors * BLOCK_SIZE
        }
    }
}

impl fmt::Debug for DiskLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} tracks{} ({} sectors, {} bytes)",
            self.template.name,
            self.track_count,
            if self.has_error_map { " with error table" } else { "" },
            self.total_sectors,
            self.file_size()
        )
    }
}

struct Catalog {
    layouts: Vec<&'static DiskLayout>,
    by_size: HashMap<usize, &'static DiskLayout>,
    by_media_type: HashMap<MediaType, &'static DiskLayout>,
}

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let mut catalog = Catalog {
            layouts: vec![],
            by_size: HashMap::new(),
            by_media_type: HashMap::new(),
        };
        for template in TEMPLATES.iter() {
            for &tracks in template.track_counts {
                for &has_error_map in &[false, true] {
                    // The catalog lives for the rest of the process.
                    let layout: &'static DiskLayout =
                        Box::leak(Box::new(DiskLayout::new(template, tracks, has_error_map)));
                    catalog.layouts.push(layout);
                    catalog.by_size.entry(layout.file_size()).or_insert(layout);
                    if !has_error_map {
                        catalog
                            .by_media_type
                            .entry(layout.media_type)
                            .or_insert(layout);
                    }
                }
            }
        }
        catalog
    })
}

/// Identify a sector image layout from the image size in bytes.
pub fn layout_by_size(size: usize) -> Option<&'static DiskLayout> {
    catalog().by_size.get(&size).copied()
}

/// The canonical layout (no error table) for a media type.
pub fn layout_by_media_type(media_type: MediaType) -> Option<&'static DiskLayout> {
    catalog().by_media_type.get(&media_type).copied()
}

/// Every layout in the catalog.
pub fn layouts() -> &'static [&'static DiskLayout] {
    &catalog().layouts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_sums() {
        for layout in layouts() {
            let sum: usize = (1..=layout.track_count)
                .map(|t| layout.sectors_in_track(t) as usize)
                .sum();
            assert_eq!(sum, layout.total_sectors, "{:?}", layout);
            let per_sector = if layout.has_error_map { 257 } else { 256 };
            assert_eq!(layout.file_size(), layout.total_sectors * per_sector);
        }
    }

    #[test]
    fn test_offsets_increase() {
        for layout in layouts() {
            for track in 2..=layout.track_count as usize {
                let previous = layout.sectors_in_track(track as u8 - 1) as usize;
                assert_eq!(
                    layout.track_offsets[track],
                    layout.track_offsets[track - 1] + previous * BLOCK_SIZE
                );
            }
        }
    }

    #[test]
    fn test_1541_zones() {
        let layout = layout_by_media_type(MediaType::FiveInchSingleSided).unwrap();
        assert_eq!(layout.track_count, 35);
        assert_eq!(layout.sectors_in_track(0), 0);
        assert_eq!(layout.sectors_in_track(1), 21);
        assert_eq!(layout.sectors_in_track(17), 21);
        assert_eq!(layout.sectors_in_track(18), 19);
        assert_eq!(layout.sectors_in_track(24), 19);
        assert_eq!(layout.sectors_in_track(25), 18);
        assert_eq!(layout.sectors_in_track(30), 18);
        assert_eq!(layout.sectors_in_track(31), 17);
        assert_eq!(layout.sectors_in_track(35), 17);
        assert_eq!(layout.sectors_in_track(36), 0);
        assert_eq!(layout.offset(18, 0), Some(0x16500));
        assert_eq!(layout.offset(35, 16), Some(0x2AA00));
        assert_eq!(layout.offset(18, 19), None);
    }

    #[test]
    fn test_known_sizes() {
        let expected: &[(usize, &str, u8, bool)] = &[
            (174_848, "1541", 35, false),
            (175_531, "1541", 35, true),
            (196_608, "1541", 40, false),
            (197_376, "1541", 40, true),
            (205_312, "1541", 42, false),
            (349_696, "1571", 70, false),
            (351_062, "1571", 70, true),
            (819_200, "1581", 80, false),
            (822_400, "1581", 80, true),
            (829_440, "1581", 81, false),
            (533_248, "8050", 77, false),
            (1_066_496, "8250", 154, false),
            (1_658_880, "FD2000", 81, false),
            (3_317_760, "FD4000", 81, false),
        ];
        for &(size, name, tracks, errors) in expected {
            let layout = layout_by_size(size).unwrap_or_else(|| panic!("no layout for {}", size));
            assert_eq!(layout.template.name, name);
            assert_eq!(layout.track_count, tracks);
            assert_eq!(layout.has_error_map, errors);
        }
        assert!(layout_by_size(0).is_none());
        assert!(layout_by_size(174_849).is_none());
    }

    #[test]
    fn test_error_map_disambiguation() {
        let plain = layout_by_size(174_848).unwrap();
        let errors = layout_by_size(174_848 + plain.total_sectors).unwrap();
        assert!(!plain.has_error_map);
        assert!(errors.has_error_map);
        assert_eq!(plain.directory_track, errors.directory_track);
        assert_eq!(plain.directory_sector, errors.directory_sector);
        assert_eq!(plain.media_type, errors.media_type);
        assert_eq!(errors.error_map_offset(), Some(174_848));
        assert_eq!(errors.sector_index(1, 0), Some(0));
        assert_eq!(errors.sector_index(2, 0), Some(21));
    }

    #[test]
    fn test_media_type_lookup() {
        let layout = layout_by_media_type(MediaType::ThreeInchDoubleDensity).unwrap();
        assert_eq!(layout.track_count, 80);
        assert_eq!(layout.directory_track, 40);
        assert_eq!(layout.directory_sector, 3);
        assert!(!layout.has_error_map);
        let layout = layout_by_media_type(MediaType::EightInchDoubleSided).unwrap();
        assert_eq!(layout.total_sectors, 4166);
        let layout = layout_by_media_type(MediaType::FiveInchDoubleSided).unwrap();
        assert_eq!(layout.total_sectors, 1366);
    }
}
