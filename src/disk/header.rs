use crate::disk::layout::MediaType;
use crate::petscii::{Petscii, PADDING_BYTE};

pub const DISK_NAME_SIZE: usize = 16;
/// The disk ID as shown in directory listings covers the two ID bytes, a
/// padding byte, and the two DOS type bytes (e.g. "ab 2a").
pub const DISK_ID_FIELD_SIZE: usize = 5;

/// GEOS itself looks for "GEOS format" to determine if a disk is
/// GEOS-formatted, although the full string is usually something like
/// "GEOS format V1.0".
static GEOS_SIGNATURE: &[u8] = b"GEOS format";
/// The GEOS signature will always be at offset 0xAD of the header block.
const GEOS_SIGNATURE_OFFSET: usize = 0xAD;

/// A HeaderFormat describes where the disk name and ID are stored in the
/// header block (sector 0 of the directory track) for a particular media
/// type.
pub struct HeaderFormat {
    pub disk_name_offset: usize,
    pub disk_id_offset: usize,
    /// Whether GEOS can format this media.  GEOS never supported the
    /// 8050/8250 drives.
    pub geos_capable: bool,
}

static HEADER_FORMAT_525: HeaderFormat = HeaderFormat {
    disk_name_offset: 0x90,
    disk_id_offset: 0xA2,
    geos_capable: true,
};

static HEADER_FORMAT_35: HeaderFormat = HeaderFormat {
    disk_name_offset: 0x04,
    disk_id_offset: 0x16,
    geos_capable: true,
};

static HEADER_FORMAT_8: HeaderFormat = HeaderFormat {
    disk_name_offset: 0x06,
    disk_id_offset: 0x18,
    geos_capable: false,
};

impl HeaderFormat {
    /// The header format for a media type, if this crate knows it.
    pub fn for_media(media_type: MediaType) -> Option<&'static HeaderFormat> {
        match media_type {
            MediaType::FiveInchSingleSided | MediaType::FiveInchDoubleSided => {
                Some(&HEADER_FORMAT_525)
            }
            MediaType::ThreeInchDoubleDensity => Some(&HEADER_FORMAT_35),
            MediaType::EightInchSingleSided | MediaType::EightInchDoubleSided => {
                Some(&HEADER_FORMAT_8)
            }
            MediaType::ThreeInchHighDensity | MediaType::ThreeInchExtendedDensity => None,
        }
    }

    /// The two-byte disk ID.
    pub fn disk_id(&self, block: &[u8]) -> [u8; 2] {
        [block[self.disk_id_offset], block[self.disk_id_offset + 1]]
    }

    /// Patch a disk name and ID into a header block.  The name is truncated
    /// to 16 bytes and padded with 0xA0.  Up to five ID bytes overwrite the
    /// ID field, so a caller can supply just the two ID bytes and keep the
    /// block's DOS type, or all five.
    pub fn write_name_and_id(&self, block: &mut [u8], name: &Petscii, id: &Petscii) {
        name.write_bytes_with_padding(
            &mut block[self.disk_name_offset..self.disk_name_offset + DISK_NAME_SIZE],
            PADDING_BYTE,
        );
        let id = id.as_bytes();
        let n = id.len().min(DISK_ID_FIELD_SIZE);
        block[self.disk_id_offset..self.disk_id_offset + n].copy_from_slice(&id[..n]);
    }
}

/// The disk name and ID as found in a header block.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub disk_name: Petscii,
    /// The five-byte ID field, including the DOS type.
    pub disk_id: Petscii,
    pub geos: bool,
}

impl Header {
    pub fn read(block: &[u8], format: &HeaderFormat) -> Header {
        let name_field =
            &block[format.disk_name_offset..format.disk_name_offset + DISK_NAME_SIZE];
        let id_field = &block[format.disk_id_offset..format.disk_id_offset + DISK_ID_FIELD_SIZE];
        Header {
            disk_name: Petscii::from_padded_bytes(name_field, PADDING_BYTE),
            disk_id: Petscii::from_bytes(id_field),
            geos: format.geos_capable && is_geos_signature(block),
        }
    }
}

fn is_geos_signature(block: &[u8]) -> bool {
    block
        .get(GEOS_SIGNATURE_OFFSET..GEOS_SIGNATURE_OFFSET + GEOS_SIGNATURE.len())
        .map(|s| s == GEOS_SIGNATURE)
        .unwrap_or(false)
}
