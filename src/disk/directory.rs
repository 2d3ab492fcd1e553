//! CBM DOS directories

use std::fmt;

use crate::disk::block::Location;
use crate::disk::chain::ChainIterator;
use crate::disk::header::{Header, HeaderFormat};
use crate::disk::DiskImage;
use crate::petscii::{Petscii, PADDING_BYTE};

const FILE_TYPE_DEL: u8 = 0x00;
const FILE_TYPE_SEQ: u8 = 0x01;
const FILE_TYPE_PRG: u8 = 0x02;
const FILE_TYPE_USR: u8 = 0x03;
const FILE_TYPE_REL: u8 = 0x04;
const FILE_ATTRIB_FILE_TYPE_MASK: u8 = 0x0F;
const FILE_ATTRIB_LOCKED_MASK: u8 = 0x40;
const FILE_ATTRIB_CLOSED_MASK: u8 = 0x80;

/// A directory entry categorizes files as SEQ, PRG, USR, or REL, along with a
/// pseudo-file-type of DEL to indicate deleted files.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FileType {
    DEL,
    SEQ,
    PRG,
    USR,
    REL,
    Unknown(u8),
}

impl FileType {
    pub fn from_byte(byte: u8) -> FileType {
        match byte & FILE_ATTRIB_FILE_TYPE_MASK {
            FILE_TYPE_DEL => FileType::DEL,
            FILE_TYPE_SEQ => FileType::SEQ,
            FILE_TYPE_PRG => FileType::PRG,
            FILE_TYPE_USR => FileType::USR,
            FILE_TYPE_REL => FileType::REL,
            b => FileType::Unknown(b),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FileType::DEL => "del",
            FileType::SEQ => "seq",
            FileType::PRG => "prg",
            FileType::USR => "usr",
            FileType::REL => "rel",
            FileType::Unknown(_) => "unk",
        })
    }
}

pub const ENTRY_SIZE: usize = 32;
const ENTRY_FILE_ATTRIBUTE_OFFSET: usize = 0x02;
const ENTRY_FIRST_SECTOR_OFFSET: usize = 0x03;
const ENTRY_FILENAME_OFFSET: usize = 0x05;
const ENTRY_FILENAME_LENGTH: usize = 16;
const ENTRY_SIDE_SECTOR_OFFSET: usize = 0x15;
const ENTRY_RECORD_LENGTH_OFFSET: usize = 0x17;
const ENTRY_FILE_SIZE_OFFSET: usize = 0x1E;

/// A decoded 32-byte directory entry.  The six bytes at 0x18..0x1E (GEOS
/// information, or the save-and-replace scratch link) are not interpreted.
#[derive(Clone, PartialEq)]
pub struct Entry {
    pub file_type: FileType,
    /// Bit 6 of the attribute byte, shown as "<" in listings.
    pub locked: bool,
    /// Bit 7 of the attribute byte.  Files are normally closed; unclosed
    /// ("splat") files are shown with a "*".
    pub closed: bool,
    pub start: Location,
    /// The filename up to the first padding byte.
    pub name: Petscii,
    /// Anything found after the first padding byte, which some disks use to
    /// hide text after the closing quote of a directory listing.
    pub name_suffix: Petscii,
    /// The first side sector of a REL file.
    pub side_sector: Location,
    /// The record length of a REL file.
    pub record_length: u8,
    /// The file size in blocks, as recorded in the entry.
    pub blocks: u16,
}

impl Entry {
    pub fn from_bytes(bytes: &[u8]) -> Entry {
        assert_eq!(bytes.len(), ENTRY_SIZE);
        let attributes = bytes[ENTRY_FILE_ATTRIBUTE_OFFSET];
        let (name, name_suffix) = Petscii::split_padded(
            &bytes[ENTRY_FILENAME_OFFSET..ENTRY_FILENAME_OFFSET + ENTRY_FILENAME_LENGTH],
            PADDING_BYTE,
        );
        Entry {
            file_type: FileType::from_byte(attributes),
            locked: attributes & FILE_ATTRIB_LOCKED_MASK != 0,
            closed: attributes & FILE_ATTRIB_CLOSED_MASK != 0,
            start: Location::from_bytes(&bytes[ENTRY_FIRST_SECTOR_OFFSET..]),
            name,
            name_suffix,
            side_sector: Location::from_bytes(&bytes[ENTRY_SIDE_SECTOR_OFFSET..]),
            record_length: bytes[ENTRY_RECORD_LENGTH_OFFSET],
            blocks: u16::from_le_bytes([
                bytes[ENTRY_FILE_SIZE_OFFSET],
                bytes[ENTRY_FILE_SIZE_OFFSET + 1],
            ]),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:<4} {:18}{}{}{}",
            self.blocks,
            format!("\"{}\"", self.name),
            if self.closed { ' ' } else { '*' },
            self.file_type,
            if self.locked { "<" } else { " " },
        )?;
        if f.alternate() {
            // verbose
            write!(f, " {} {:?}", self.start, self.name_suffix)?;
            if self.file_type == FileType::REL {
                write!(f, " side {} record {}", self.side_sector, self.record_length)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?},{},{}{:?} @ {}",
            self.name,
            self.blocks,
            if self.closed { "" } else { "*" },
            self.file_type,
            self.start
        )
    }
}

/// A directory listing reconstructed from the disk's blocks.  Nothing is
/// cached: every call to `DiskImage::read_directory()` builds a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Directory {
    pub name: Petscii,
    /// The ID field of the header, including the DOS type (e.g. "01 2a").
    pub id: Petscii,
    pub free_blocks: Option<usize>,
    pub entries: Vec<Entry>,
    pub geos: bool,
}

impl Directory {
    /// The first entry with the given name.
    pub fn find(&self, name: &Petscii) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == *name)
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0 \"{:16}\" {}", self.name, self.id)?;
        if self.geos {
            write!(f, " (GEOS)")?;
        }
        writeln!(f)?;
        for entry in &self.entries {
            if f.alternate() {
                writeln!(f, "{:#}", entry)?;
            } else {
                writeln!(f, "{}", entry)?;
            }
        }
        match self.free_blocks {
            Some(free) => write!(f, "{} blocks free.", free),
            None => write!(f, "? blocks free."),
        }
    }
}

/// Walk the directory chain and read the header block.  A chain that loops
/// or runs into an unreadable block ends the listing early without error.
pub fn read_directory<D: DiskImage + ?Sized>(disk: &D) -> Directory {
    let start = Location(disk.directory_track(), disk.directory_sector());
    let mut entries = vec![];
    for sector in ChainIterator::new(disk, start) {
        let sector = match sector {
            Ok(sector) => sector,
            Err(_) => break,
        };
        entries.extend(
            sector
                .data
                .chunks_exact(ENTRY_SIZE)
                .filter(|bytes| bytes[ENTRY_FILE_ATTRIBUTE_OFFSET] != 0)
                .map(Entry::from_bytes),
        );
    }

    let header = HeaderFormat::for_media(disk.media_type()).and_then(|format| {
        disk.get_block(disk.directory_track(), 0)
            .map(|block| Header::read(&block, format))
    });
    let (name, id, geos) = match header {
        Some(header) => (header.disk_name, header.disk_id, header.geos),
        None => (Petscii::default(), Petscii::default(), false),
    };

    Directory {
        name,
        id,
        free_blocks: disk.read_free_blocks(),
        entries,
        geos,
    }
}
