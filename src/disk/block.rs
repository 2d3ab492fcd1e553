use std::fmt;
use std::io::{self, Write};

use crate::disk::DiskImage;
use crate::util;

pub const BLOCK_SIZE: usize = 256;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct Location(pub u8, pub u8); // Track and sector

impl Location {
    #[inline]
    pub fn new(track: u8, sector: u8) -> Location {
        Location(track, sector)
    }

    pub fn from_bytes(bytes: &[u8]) -> Location {
        assert!(bytes.len() >= 2);
        Location(bytes[0], bytes[1])
    }

    pub fn write_bytes(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= 2);
        bytes[0] = self.0;
        bytes[1] = self.1;
    }

    #[inline]
    pub fn track(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn sector(&self) -> u8 {
        self.1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// Iterate over every addressable block of a disk image, in track-major
/// order.
pub struct LocationIterator<'a> {
    disk: &'a dyn DiskImage,
    next: Option<Location>,
}

impl<'a> LocationIterator<'a> {
    pub fn new(disk: &'a dyn DiskImage) -> LocationIterator<'a> {
        const FIRST_TRACK: u8 = 1;
        let next = if disk.track_count() >= FIRST_TRACK && disk.sectors_in_track(FIRST_TRACK) > 0 {
            Some(Location::new(FIRST_TRACK, 0))
        } else {
            None
        };
        LocationIterator { disk, next }
    }
}

impl<'a> Iterator for LocationIterator<'a> {
    type Item = Location;

    fn next(&mut self) -> Option<Location> {
        let location = self.next?;

        let mut next_location = location;
        next_location.1 += 1;
        while next_location.1 >= self.disk.sectors_in_track(next_location.0) {
            if next_location.0 >= self.disk.track_count() {
                self.next = None;
                return Some(location);
            }
            next_location.0 += 1;
            next_location.1 = 0;
        }
        self.next = Some(next_location);
        Some(location)
    }
}

/// Write a hex dump of a single block.  Unreadable blocks are reported
/// rather than treated as an error, since GCR images routinely have them.
pub fn dump_block(disk: &dyn DiskImage, location: Location, writer: &mut dyn Write) -> io::Result<()> {
    writeln!(writer, "track {:02} sector {:02}", location.0, location.1)?;
    match disk.get_block(location.0, location.1) {
        Some(block) => writeln!(writer, "{}", util::hex(&block)),
        None => writeln!(writer, "(unreadable)"),
    }
}

/// Write a hex dump of every block of the disk image.
pub fn dump(disk: &dyn DiskImage, writer: &mut dyn Write) -> io::Result<()> {
    for location in LocationIterator::new(disk) {
        writeln!(writer)?;
        dump_block(disk, location, writer)?;
    }
    Ok(())
}
