use std::collections::HashSet;
use std::fmt;

use cbmimage::disk::block::LocationIterator;
use cbmimage::disk::chain::{write_chain, CHAIN_DATA_SIZE};
use cbmimage::disk::directory::ENTRY_SIZE;
use cbmimage::disk::gcr::GcrWriter;
use cbmimage::disk::layout::layouts;
use cbmimage::disk::{
    self, layout_by_size, DiskError, DiskImage, FileType, GcrImage, Location, MediaType,
    RawSectorImage, BLOCK_SIZE,
};
use cbmimage::Petscii;
use rand::{Rng, XorShiftRng};

const ITERATIONS: usize = 20;
const MIN_FILE_SIZE: usize = 0;
const MAX_FILE_SIZE: usize = 8 * 1024;
const FILES_PER_DISK: usize = 8;
const RNG_SEED: [u8; 16] = [
    0x04, 0xC1, 0x1D, 0xB7, 0x1E, 0xDC, 0x6F, 0x41, 0x74, 0x1B, 0x8C, 0xD7, 0x32, 0x58, 0x34, 0x99,
];

static MEDIA_TYPES: &[MediaType] = &[
    MediaType::FiveInchSingleSided,
    MediaType::FiveInchDoubleSided,
    MediaType::ThreeInchDoubleDensity,
];

fn deterministic_rng() -> XorShiftRng {
    rand::SeedableRng::from_seed(RNG_SEED)
}

/// A random name of unshifted letters, which never includes the 0xA0
/// padding byte.
fn random_name(rng: &mut impl Rng, max: usize) -> Petscii {
    let name_size = rng.gen_range(1, max + 1);
    let bytes: Vec<u8> = (0..name_size).map(|_| rng.gen_range(0x41, 0x5B)).collect();
    Petscii::from_bytes(&bytes)
}

fn new_disk(rng: &mut impl Rng, media_type: MediaType) -> (RawSectorImage, Petscii, Petscii) {
    let name = random_name(rng, 16);
    let id = Petscii::from_bytes(&[rng.gen_range(0x30, 0x3A), rng.gen_range(0x30, 0x3A)]);
    let disk = RawSectorImage::create(media_type, &name, &id).unwrap();
    (disk, name, id)
}

/// Every block outside the directory track, and outside the 1571's BAM
/// track.
fn data_locations(disk: &dyn DiskImage) -> Vec<Location> {
    LocationIterator::new(disk)
        .filter(|l| l.0 != disk.directory_track())
        .filter(|l| !(disk.media_type() == MediaType::FiveInchDoubleSided && l.0 == 53))
        .collect()
}

fn entry_bytes(file_type: u8, start: Location, name: &Petscii, blocks: u16) -> [u8; ENTRY_SIZE] {
    let mut bytes = [0u8; ENTRY_SIZE];
    bytes[0x02] = file_type;
    start.write_bytes(&mut bytes[0x03..]);
    name.write_bytes_with_padding(&mut bytes[0x05..0x15], 0xA0);
    bytes[0x1E..0x20].copy_from_slice(&blocks.to_le_bytes());
    bytes
}

/// Put an entry in a slot of a directory block, leaving the block's link
/// alone.
fn write_entry(disk: &mut dyn DiskImage, location: Location, slot: usize, entry: &[u8; ENTRY_SIZE]) {
    let mut block = disk.get_block(location.0, location.1).unwrap();
    let offset = slot * ENTRY_SIZE;
    block[offset + 2..offset + ENTRY_SIZE].copy_from_slice(&entry[2..]);
    assert!(disk.write_block(location.0, location.1, &block));
}

fn set_link(disk: &mut dyn DiskImage, location: Location, next: Location) {
    let mut block = disk.get_block(location.0, location.1).unwrap();
    next.write_bytes(&mut block);
    assert!(disk.write_block(location.0, location.1, &block));
}

struct RandomFile {
    name: Petscii,
    contents: Vec<u8>,
}

impl RandomFile {
    fn new(rng: &mut XorShiftRng, used_names: &mut HashSet<Petscii>) -> RandomFile {
        let name = loop {
            let name = random_name(rng, 16);
            if used_names.insert(name.clone()) {
                break name;
            }
        };
        let size: usize = rng.gen_range(MIN_FILE_SIZE, MAX_FILE_SIZE);
        let mut contents = vec![0u8; size];
        rng.fill(&mut contents[..]);
        RandomFile { name, contents }
    }

    fn blocks(&self) -> usize {
        ((self.contents.len() + CHAIN_DATA_SIZE - 1) / CHAIN_DATA_SIZE).max(1)
    }

    fn write(&self, rng: &mut XorShiftRng, disk: &mut RandomDisk, slot: usize) {
        let locations: Vec<Location> = (0..self.blocks())
            .map(|_| {
                let i = rng.gen_range(0, disk.free.len());
                disk.free.swap_remove(i)
            })
            .collect();
        write_chain(&mut disk.image, &locations, &self.contents).unwrap();
        let directory = Location(disk.image.directory_track(), disk.image.directory_sector());
        let entry = entry_bytes(0x82, locations[0], &self.name, self.blocks() as u16);
        write_entry(&mut disk.image, directory, slot, &entry);
    }

    fn verify(&self, disk: &dyn DiskImage) {
        let entry = disk
            .find_entry(&self.name)
            .unwrap_or_else(|| panic!("{} is missing", self));
        assert_eq!(entry.file_type, FileType::PRG);
        assert!(entry.closed);
        assert_eq!(entry.blocks as usize, self.blocks());
        let contents = disk.read_entry(&entry).unwrap();
        assert!(contents == self.contents, "{} differs", self);
    }
}

impl fmt::Display for RandomFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({} bytes)", self.name, self.contents.len())
    }
}

struct RandomDisk {
    image: RawSectorImage,
    free: Vec<Location>,
}

#[test]
fn blank_round_trip() {
    let expected_free = [664, 1328, 3160];
    let mut rng = deterministic_rng();
    for (media_type, free) in MEDIA_TYPES.iter().zip(expected_free.iter()) {
        let (disk, name, id) = new_disk(&mut rng, *media_type);
        let directory = disk.read_directory();
        assert_eq!(directory.entries.len(), 0);
        assert_eq!(directory.free_blocks, Some(*free));
        assert_eq!(directory.name, name);
        assert_eq!(&directory.id.as_bytes()[..2], id.as_bytes());
        assert_eq!(directory.id.as_bytes()[2], 0xA0);
        assert!(!directory.geos);
        assert_eq!(disk.disk_id().unwrap(), [id.as_bytes()[0], id.as_bytes()[1]]);
    }
}

#[test]
fn name_and_id_limits() {
    let long_name: Petscii = "a name that is far too long".into();
    let long_id: Petscii = "abcdefg".into();
    let disk = RawSectorImage::create(MediaType::FiveInchSingleSided, &long_name, &long_id).unwrap();
    let directory = disk.read_directory();
    assert_eq!(directory.name.as_bytes(), &long_name.as_bytes()[..16]);
    assert_eq!(directory.id.as_bytes(), &long_id.as_bytes()[..5]);
    // The rest of the header is unaffected.
    assert_eq!(directory.free_blocks, Some(664));
}

#[test]
fn concrete_1541_scenario() {
    let disk = disk::from_bytes(vec![0u8; 174_848]).unwrap();
    assert_eq!(disk.directory_track(), 18);
    assert_eq!(disk.directory_sector(), 1);
    assert_eq!(disk.media_type(), MediaType::FiveInchSingleSided);
    assert_eq!(disk.sectors_in_track(18), 19);
    assert_eq!(disk.track_count(), 35);
    // An unformatted disk has an empty directory and a BAM with no space.
    let directory = disk.read_directory();
    assert!(directory.entries.is_empty());
    assert_eq!(directory.free_blocks, Some(0));
}

#[test]
fn geometry_invariant() {
    for layout in layouts() {
        let sum: usize = (1..=layout.track_count)
            .map(|t| layout.sectors_in_track(t) as usize)
            .sum();
        assert_eq!(sum, layout.total_sectors, "{:?}", layout);
        let per_sector = if layout.has_error_map {
            BLOCK_SIZE + 1
        } else {
            BLOCK_SIZE
        };
        assert_eq!(layout.file_size(), layout.total_sectors * per_sector);
    }
}

#[test]
fn size_disambiguation() {
    for layout in layouts().iter().filter(|l| !l.has_error_map) {
        let plain = layout_by_size(layout.file_size()).unwrap();
        let mapped = layout_by_size(layout.file_size() + layout.total_sectors).unwrap();
        assert!(!plain.has_error_map);
        assert!(mapped.has_error_map);
        assert_eq!(plain.directory_track, mapped.directory_track);
        assert_eq!(plain.directory_sector, mapped.directory_sector);
        assert_eq!(plain.media_type, mapped.media_type);
        assert_eq!(plain.total_sectors, mapped.total_sectors);
    }
}

#[test]
fn sector_image_bounds() {
    for media_type in MEDIA_TYPES {
        let mut rng = deterministic_rng();
        let (mut disk, _, _) = new_disk(&mut rng, *media_type);
        let tracks = disk.track_count();
        assert!(disk.get_block(0, 0).is_none());
        assert!(disk.get_block(tracks + 1, 0).is_none());
        for track in 1..=tracks {
            let sectors = disk.sectors_in_track(track);
            assert!(disk.get_block(track, sectors - 1).is_some());
            assert!(disk.get_block(track, sectors).is_none());
        }
        assert!(!disk.write_block(tracks + 1, 0, &[0; BLOCK_SIZE]));
        assert!(!disk.write_block(1, 0, &[0; 10]));
    }
}

#[test]
fn gcr_image_bounds() {
    let mut rng = deterministic_rng();
    let (disk, _, _) = new_disk(&mut rng, MediaType::FiveInchSingleSided);
    let flux = GcrImage::from_sector_image(&disk).unwrap();
    assert!(flux.get_block(0, 0).is_none());
    assert!(flux.get_block(43, 0).is_none());
    for track in 1..=35 {
        let sectors = flux.sectors_in_track(track);
        assert_eq!(flux.get_block(track, sectors - 1), disk.get_block(track, sectors - 1));
        assert!(flux.get_block(track, sectors).is_none());
    }
    // Tracks 36-42 exist in the container but hold no data.
    assert!(flux.get_block(36, 0).is_none());
}

#[test]
fn gcr_synthetic_sector() {
    const TRACK: u8 = 5;
    const SECTOR: u8 = 3;
    let payload: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i as u8).wrapping_mul(13)).collect();
    let mut writer = GcrWriter::new();
    writer.write_raw(&[0x55; 20]);
    writer.write_sector(TRACK, SECTOR, *b"zz", &payload);
    let flux = writer.into_bytes();

    let half_tracks = 84usize;
    let mut bytes = b"GCR-1541".to_vec();
    bytes.push(0);
    bytes.push(half_tracks as u8);
    bytes.extend_from_slice(&7928u16.to_le_bytes());
    bytes.resize(12 + half_tracks * 4, 0);
    let offset = bytes.len() as u32;
    let entry = 12 + (TRACK as usize - 1) * 2 * 4;
    bytes[entry..entry + 4].copy_from_slice(&offset.to_le_bytes());
    bytes.extend_from_slice(&(flux.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&flux);

    let disk = disk::from_bytes(bytes).unwrap();
    assert_eq!(disk.get_block(TRACK, SECTOR), Some(payload));
    assert_eq!(disk.get_block(TRACK, SECTOR + 1), None);
    assert_eq!(disk.get_block(TRACK + 1, SECTOR), None);
}

#[test]
fn directory_loop() {
    let mut rng = deterministic_rng();
    let (mut disk, _, _) = new_disk(&mut rng, MediaType::FiveInchSingleSided);
    let first = Location(18, 1);
    let second = Location(18, 4);
    assert!(disk.write_block(second.0, second.1, &[0; BLOCK_SIZE]));
    for slot in 0..8 {
        let name = Petscii::from_bytes(&[0x41 + slot as u8]);
        write_entry(&mut disk, first, slot, &entry_bytes(0x81, Location(1, 0), &name, 1));
        let name = Petscii::from_bytes(&[0x41 + slot as u8, 0x42]);
        write_entry(&mut disk, second, slot, &entry_bytes(0x81, Location(1, 0), &name, 1));
    }
    set_link(&mut disk, first, second);
    set_link(&mut disk, second, first);
    let directory = disk.read_directory();
    assert_eq!(directory.entries.len(), 16);
    assert_eq!(directory.entries[8].name.as_bytes(), &[0x41, 0x42]);

    // A directory block that links to itself.
    set_link(&mut disk, first, first);
    assert_eq!(disk.read_directory().entries.len(), 8);

    // A link off the end of the disk.
    set_link(&mut disk, first, Location(99, 0));
    assert_eq!(disk.read_directory().entries.len(), 8);
}

#[test]
fn file_loop() {
    let mut rng = deterministic_rng();
    let (mut disk, _, _) = new_disk(&mut rng, MediaType::ThreeInchDoubleDensity);
    let data = vec![0x5A; CHAIN_DATA_SIZE * 3];
    let chain = [Location(1, 0), Location(1, 1), Location(1, 2)];
    write_chain(&mut disk, &chain, &data).unwrap();
    assert_eq!(disk.read_file(1, 0), Some(data));

    set_link(&mut disk, Location(1, 2), Location(1, 1));
    assert_eq!(disk.read_file(1, 0), None);
    set_link(&mut disk, Location(1, 0), Location(1, 0));
    assert_eq!(disk.read_file(1, 0), None);
}

#[test]
fn random_files() {
    let mut rng = deterministic_rng();
    for iteration in 0..ITERATIONS {
        let media_type = MEDIA_TYPES[iteration % MEDIA_TYPES.len()];
        let (image, _, _) = new_disk(&mut rng, media_type);
        let free = data_locations(&image);
        let mut disk = RandomDisk { image, free };
        let mut used_names = HashSet::new();
        let files: Vec<RandomFile> = (0..FILES_PER_DISK)
            .map(|_| RandomFile::new(&mut rng, &mut used_names))
            .collect();
        for (slot, file) in files.iter().enumerate() {
            file.write(&mut rng, &mut disk, slot);
        }

        assert_eq!(disk.image.read_directory().entries.len(), FILES_PER_DISK);
        for file in &files {
            file.verify(&disk.image);
        }

        // The same files, read back through flux.
        if media_type == MediaType::FiveInchSingleSided {
            let flux = GcrImage::from_sector_image(&disk.image).unwrap();
            for file in &files {
                file.verify(&flux);
            }
        }
    }
}

#[test]
fn save_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("work.d64");
    let mut rng = deterministic_rng();
    let (mut image, name, _) = new_disk(&mut rng, MediaType::FiveInchSingleSided);
    image.save_as(&path).unwrap();

    let mut disk = disk::open(&path).unwrap();
    assert_eq!(disk.read_directory().name, name);
    let contents = b"10 PRINT \"HELLO\"".to_vec();
    write_chain(&mut *disk, &[Location(17, 0)], &contents).unwrap();
    write_entry(
        &mut *disk,
        Location(18, 1),
        0,
        &entry_bytes(0x82, Location(17, 0), &"hello".into(), 1),
    );
    disk.save().unwrap();

    let disk = disk::open(&path).unwrap();
    let entry = disk.find_entry(&"hello".into()).unwrap();
    assert_eq!(disk.read_entry(&entry), Some(contents));

    // Flux images round trip through a file as well.
    let g64 = dir.path().join("work.g64");
    let source = RawSectorImage::open(&path).unwrap();
    let mut flux = GcrImage::from_sector_image(&source).unwrap();
    flux.save_as(&g64).unwrap();
    let reopened = disk::open(&g64).unwrap();
    assert_eq!(reopened.read_directory(), disk.read_directory());
}

#[test]
fn unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.d64");
    std::fs::write(&path, vec![0u8; 1000]).unwrap();
    let error = disk::open(&path).err().unwrap();
    assert_eq!(error, DiskError::UnknownFormat);

    let missing = dir.path().join("missing.d64");
    assert!(disk::open(&missing).is_err());
}
