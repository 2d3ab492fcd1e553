//! Group Coded Recording (GCR) as written by the 1541 and 1571 drives.
//!
//! Every nibble is recorded as a 5-bit code with no more than two
//! consecutive zeros and no more than eight consecutive ones, so a run of
//! ten or more one bits can only be a sync mark.  A sector is recorded as:
//!
//! ```text
//! sync | header: 08 checksum sector track id2 id1 0f 0f | gap |
//! sync | data:   07 <256 bytes> checksum 00 00          | gap
//! ```
//!
//! Gaps are raw (not GCR coded) 0x55 bytes.

use log::trace;

use crate::disk::bitstream::BitStream;
use crate::disk::block::BLOCK_SIZE;

pub const HEADER_BLOCK_ID: u8 = 0x08;
pub const DATA_BLOCK_ID: u8 = 0x07;

/// Decoded header bytes: block ID, checksum, sector, track, ID2, ID1.
pub const HEADER_SIZE: usize = 6;
/// Decoded data bytes: block ID, payload, checksum.
pub const DATA_SIZE: usize = 0x102;

/// The minimum run of one bits that constitutes a sync mark.
const SYNC_BITS: usize = 10;
/// Sync marks written by the encoder (five 0xFF bytes, as the drive does).
const SYNC_BYTES: usize = 5;
const HEADER_GAP_BYTES: usize = 9;
const SECTOR_GAP_BYTES: usize = 9;
const GAP_BYTE: u8 = 0x55;

#[rustfmt::skip]
static ENCODE: [u8; 16] = [
    0x0A, 0x0B, 0x12, 0x13, 0x0E, 0x0F, 0x16, 0x17,
    0x09, 0x19, 0x1A, 0x1B, 0x0D, 0x1D, 0x1E, 0x15,
];

/// Invalid code points have the high nibble set.
#[rustfmt::skip]
static DECODE: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0x08, 0x00, 0x01, 0xFF, 0x0C, 0x04, 0x05,
    0xFF, 0xFF, 0x02, 0x03, 0xFF, 0x0F, 0x06, 0x07,
    0xFF, 0x09, 0x0A, 0x0B, 0xFF, 0x0D, 0x0E, 0xFF,
];

/// Advance past the next sync mark.  On success the stream is positioned
/// at the zero bit that terminated the mark, which is the first bit of the
/// following block.
pub fn find_sync(bits: &mut BitStream) -> bool {
    let mut ones = 0usize;
    while let Some(bit) = bits.read_bit() {
        if bit {
            ones += 1;
        } else if ones >= SYNC_BITS {
            bits.rewind(1);
            return true;
        } else {
            ones = 0;
        }
    }
    false
}

/// Decode one byte from a pair of 5-bit codes.
pub fn decode_byte(bits: &mut BitStream) -> Option<u8> {
    let high = DECODE[bits.read(5)? as usize];
    let low = DECODE[bits.read(5)? as usize];
    if high & 0xF0 != 0 || low & 0xF0 != 0 {
        return None;
    }
    Some(high << 4 | low)
}

/// Decode `count` bytes, failing on truncation or on any invalid code.
pub fn decode_bytes(bits: &mut BitStream, count: usize) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(count);
    for _ in 0..count {
        bytes.push(decode_byte(bits)?);
    }
    Some(bytes)
}

#[inline]
pub fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |a, b| a ^ b)
}

/// A validated sector header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorHeader {
    pub sector: u8,
    pub track: u8,
    pub id: [u8; 2],
}

impl SectorHeader {
    /// Validate decoded header bytes: block ID 0x08 and an XOR checksum
    /// over sector, track, and both ID bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<SectorHeader> {
        if bytes.len() < HEADER_SIZE || bytes[0] != HEADER_BLOCK_ID {
            return None;
        }
        if bytes[1] != xor(&bytes[2..6]) {
            return None;
        }
        Some(SectorHeader {
            sector: bytes[2],
            track: bytes[3],
            // Recorded as ID2, ID1.
            id: [bytes[5], bytes[4]],
        })
    }
}

/// Decode every sector found in one half-track of flux data, in the order
/// they appear.  Decoding stops at the first failed sync search; blocks
/// that fail to decode are skipped.
pub fn decode_track(flux: &[u8], verify_data_checksum: bool) -> Vec<(SectorHeader, Vec<u8>)> {
    let mut bits = BitStream::new(flux);
    let mut sectors = Vec::new();
    while find_sync(&mut bits) {
        let header = match decode_bytes(&mut bits, HEADER_SIZE) {
            Some(bytes) => bytes,
            None => {
                trace!("invalid GCR in header at bit {}", bits.position());
                continue;
            }
        };
        let header = match SectorHeader::from_bytes(&header) {
            Some(header) => header,
            None => {
                trace!("rejected header {:02x?} at bit {}", header, bits.position());
                continue;
            }
        };

        if !find_sync(&mut bits) {
            break;
        }
        let data = match decode_bytes(&mut bits, DATA_SIZE) {
            Some(data) => data,
            None => {
                trace!("invalid GCR in data block of sector {}", header.sector);
                continue;
            }
        };
        if data[0] != DATA_BLOCK_ID {
            trace!("sector {} data block ID is {:02x}", header.sector, data[0]);
            continue;
        }
        let payload = &data[1..1 + BLOCK_SIZE];
        if verify_data_checksum && xor(payload) != data[1 + BLOCK_SIZE] {
            trace!("sector {} data checksum mismatch", header.sector);
            continue;
        }
        trace!("decoded track {} sector {}", header.track, header.sector);
        sectors.push((header, payload.to_vec()));
    }
    sectors
}

/// Collects bits MSB-first into bytes.
pub struct GcrWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl GcrWriter {
    pub fn new() -> GcrWriter {
        GcrWriter {
            bytes: Vec::new(),
            bits: 0,
        }
    }

    fn write_bits(&mut self, value: u32, count: usize) {
        for i in (0..count).rev() {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - self.bits % 8);
            self.bits += 1;
        }
    }

    /// Write raw (uncoded) bytes such as gaps and sync marks.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.write_bits(*b as u32, 8);
        }
    }

    pub fn write_sync(&mut self) {
        self.write_raw(&[0xFF; SYNC_BYTES]);
    }

    /// Write bytes as pairs of 5-bit codes.
    pub fn write_gcr(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.write_bits(ENCODE[(b >> 4) as usize] as u32, 5);
            self.write_bits(ENCODE[(b & 0x0F) as usize] as u32, 5);
        }
    }

    /// Write one complete sector: header block, gap, data block, gap.
    pub fn write_sector(&mut self, track: u8, sector: u8, id: [u8; 2], data: &[u8]) {
        assert_eq!(data.len(), BLOCK_SIZE);
        let checksum = xor(&[sector, track, id[1], id[0]]);
        self.write_sync();
        self.write_gcr(&[
            HEADER_BLOCK_ID,
            checksum,
            sector,
            track,
            id[1],
            id[0],
            0x0F,
            0x0F,
        ]);
        self.write_raw(&[GAP_BYTE; HEADER_GAP_BYTES]);

        self.write_sync();
        let mut block = Vec::with_capacity(BLOCK_SIZE + 4);
        block.push(DATA_BLOCK_ID);
        block.extend_from_slice(data);
        block.push(xor(data));
        block.extend_from_slice(&[0x00, 0x00]);
        self.write_gcr(&block);
        self.write_raw(&[GAP_BYTE; SECTOR_GAP_BYTES]);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl Default for GcrWriter {
    fn default() -> GcrWriter {
        GcrWriter::new()
    }
}
