use std::collections::HashSet;

use log::debug;

use crate::disk::block::{Location, BLOCK_SIZE};
use crate::disk::error::DiskError;
use crate::disk::DiskImage;

/// Payload bytes carried by each block of a chain.
pub const CHAIN_DATA_SIZE: usize = BLOCK_SIZE - 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChainLink {
    Next(Location),
    Tail(usize), // used bytes
}

impl ChainLink {
    #[inline]
    pub fn new(block: &[u8]) -> ChainLink {
        if block[0] == 0x00 {
            // This is the last sector of the chain, so the next byte is the
            // index of the last used byte.  Values below 2 point into the
            // link itself and leave no data.
            ChainLink::Tail((block[1] as usize + 1).max(2)) // 2..=256
        } else {
            ChainLink::Next(Location::new(block[0], block[1]))
        }
    }

    #[inline]
    pub fn to_bytes(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= 2);
        match &self {
            ChainLink::Next(location) => location.write_bytes(bytes),
            ChainLink::Tail(size) => {
                assert!(*size >= 2 && *size <= BLOCK_SIZE);
                bytes[0] = 0x00;
                bytes[1] = (*size - 1) as u8;
            }
        }
    }
}

/// A ChainSector is the result of a chain iteration, and provides the block contents and the
/// location from which it was read.
pub struct ChainSector {
    /// The 256-byte block contents, which includes the two-byte NTS (next track and sector) link.
    pub data: Vec<u8>,
    pub location: Location,
    pub link: ChainLink,
}

impl ChainSector {
    /// The data bytes of this block: everything after the link, up to the
    /// used size for the tail block.
    pub fn payload(&self) -> &[u8] {
        match self.link {
            ChainLink::Next(_) => &self.data[2..],
            ChainLink::Tail(size) => &self.data[2..size],
        }
    }
}

/// Follows a chain of linked blocks.  A block that cannot be read, or a link
/// back to a block already visited, ends the iteration with an error.
pub struct ChainIterator<'a, D: DiskImage + ?Sized> {
    disk: &'a D,
    next_sector: Option<Location>,
    visited_sectors: HashSet<Location>,
}

impl<'a, D: DiskImage + ?Sized> ChainIterator<'a, D> {
    /// Create a new chain iterator starting at the specified location.
    pub fn new(disk: &'a D, starting_sector: Location) -> ChainIterator<'a, D> {
        ChainIterator {
            disk,
            next_sector: Some(starting_sector),
            visited_sectors: HashSet::new(),
        }
    }

    /// Read the entire chain and return a list of locations.
    pub fn locations(self) -> Result<Vec<Location>, DiskError> {
        self.map(|r| r.map(|cs| cs.location)).collect()
    }
}

impl<'a, D: DiskImage + ?Sized> Iterator for ChainIterator<'a, D> {
    type Item = Result<ChainSector, DiskError>;

    fn next(&mut self) -> Option<Result<ChainSector, DiskError>> {
        let location = self.next_sector.take()?;

        // Loop detection.
        if !self.visited_sectors.insert(location) {
            debug!("chain loop at {}", location);
            return Some(Err(DiskError::ChainLoop));
        }

        let block = match self.disk.get_block(location.0, location.1) {
            Some(block) => block,
            None => {
                debug!("chain block {} is unreadable", location);
                return Some(Err(DiskError::InvalidLocation));
            }
        };

        let link = ChainLink::new(&block);
        if let ChainLink::Next(next) = link {
            self.next_sector = Some(next);
        }

        Some(Ok(ChainSector {
            data: block,
            location,
            link,
        }))
    }
}

/// Read the payload of a chain: everything but the link bytes of each
/// block.
pub fn read_chain<D: DiskImage + ?Sized>(disk: &D, start: Location) -> Result<Vec<u8>, DiskError> {
    let mut bytes = vec![];
    for sector in ChainIterator::new(disk, start) {
        bytes.extend_from_slice(sector?.payload());
    }
    Ok(bytes)
}

/// Write `data` as a chain through the given blocks, which must be exactly
/// as many as the data needs (at least one).  Allocation is the caller's
/// business; the BAM is left untouched.
pub fn write_chain<D: DiskImage + ?Sized>(
    disk: &mut D,
    locations: &[Location],
    data: &[u8],
) -> Result<(), DiskError> {
    let needed = ((data.len() + CHAIN_DATA_SIZE - 1) / CHAIN_DATA_SIZE).max(1);
    if locations.len() != needed {
        return Err(DiskError::WriteSize);
    }
    let mut chunks: Vec<&[u8]> = data.chunks(CHAIN_DATA_SIZE).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }
    for (i, (location, chunk)) in locations.iter().zip(chunks).enumerate() {
        let mut block = [0u8; BLOCK_SIZE];
        let link = match locations.get(i + 1) {
            Some(next) => ChainLink::Next(*next),
            None => ChainLink::Tail(chunk.len() + 2),
        };
        link.to_bytes(&mut block);
        block[2..2 + chunk.len()].copy_from_slice(chunk);
        if !disk.write_block(location.0, location.1, &block) {
            return Err(DiskError::InvalidLocation);
        }
    }
    Ok(())
}
