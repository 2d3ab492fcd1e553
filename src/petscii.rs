//! PETSCII byte strings.
//!
//! Commodore directories store names as raw PETSCII bytes padded with
//! shifted spaces (0xA0).  `Petscii` keeps the bytes verbatim, so names can
//! be compared and written back without loss, and only converts to Unicode
//! for display.

use std::fmt;

/// The shifted space used to pad names, IDs, and other fixed-width fields.
pub const PADDING_BYTE: u8 = 0xA0;

/// A string of PETSCII bytes.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Petscii(Vec<u8>);

impl Petscii {
    pub fn from_bytes(bytes: &[u8]) -> Petscii {
        Petscii(bytes.to_vec())
    }

    /// Create a PETSCII string from a fixed-width field, removing any
    /// trailing padding bytes.
    pub fn from_padded_bytes(bytes: &[u8], padding: u8) -> Petscii {
        let end = bytes
            .iter()
            .rposition(|b| *b != padding)
            .map(|p| p + 1)
            .unwrap_or(0);
        Petscii(bytes[..end].to_vec())
    }

    /// Split a fixed-width field at the first padding byte.  The first
    /// string is the visible name; the second holds whatever follows the
    /// padding marker (with trailing padding removed), which is where
    /// directory art and ",8,1" tricks hide.
    pub fn split_padded(bytes: &[u8], padding: u8) -> (Petscii, Petscii) {
        match bytes.iter().position(|b| *b == padding) {
            Some(p) => (
                Petscii(bytes[..p].to_vec()),
                Petscii::from_padded_bytes(&bytes[p + 1..], padding),
            ),
            None => (Petscii(bytes.to_vec()), Petscii::default()),
        }
    }

    /// Write this string into a fixed-width field, truncating it if it is
    /// too long and filling the remainder with the padding byte.
    pub fn write_bytes_with_padding(&self, bytes: &mut [u8], padding: u8) {
        let n = self.0.len().min(bytes.len());
        bytes[..n].copy_from_slice(&self.0[..n]);
        for b in bytes[n..].iter_mut() {
            *b = padding;
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a `String`, escaping bytes with no printable equivalent as
    /// `{$xx}`.
    pub fn to_escaped_string(&self) -> String {
        let mut s = String::with_capacity(self.0.len());
        for b in &self.0 {
            match to_char(*b) {
                Some(c) => s.push(c),
                None => s.push_str(&format!("{{${:02x}}}", b)),
            }
        }
        s
    }
}

/// Map a PETSCII byte to its closest Unicode character, in the unshifted
/// (lowercase/uppercase) character set.
fn to_char(b: u8) -> Option<char> {
    match b {
        0x20..=0x40 | 0x5B | 0x5D => Some(b as char),
        0x41..=0x5A => Some((b - 0x41 + b'a') as char),
        0x5C => Some('£'),
        0x5E => Some('↑'),
        0x5F => Some('←'),
        0x61..=0x7A => Some((b - 0x61 + b'A') as char),
        0xC1..=0xDA => Some((b - 0xC1 + b'A') as char),
        0xA0 => Some(' '),
        _ => None,
    }
}

fn from_char(c: char) -> u8 {
    match c {
        'a'..='z' => c as u8 - b'a' + 0x41,
        'A'..='Z' => c as u8 - b'A' + 0xC1,
        ' '..='@' | '[' | ']' => c as u8,
        '£' => 0x5C,
        '↑' => 0x5E,
        '←' => 0x5F,
        _ => b'?',
    }
}

impl<'a> From<&'a str> for Petscii {
    fn from(string: &str) -> Petscii {
        Petscii(string.chars().map(from_char).collect())
    }
}

impl From<String> for Petscii {
    fn from(string: String) -> Petscii {
        string.as_str().into()
    }
}

impl<'a> From<&'a [u8]> for Petscii {
    fn from(bytes: &[u8]) -> Petscii {
        Petscii::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for Petscii {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Petscii {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s: String = self
            .0
            .iter()
            .map(|b| to_char(*b).unwrap_or('\u{FFFD}'))
            .collect();
        f.pad(&s)
    }
}

impl fmt::Debug for Petscii {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.to_escaped_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        let field = [0x41, 0x42, 0xA0, 0xA0];
        assert_eq!(Petscii::from_padded_bytes(&field, PADDING_BYTE).as_bytes(), &[0x41, 0x42]);
        assert!(Petscii::from_padded_bytes(&[0xA0; 16], PADDING_BYTE).is_empty());

        let mut out = [0u8; 6];
        Petscii::from("ab").write_bytes_with_padding(&mut out, PADDING_BYTE);
        assert_eq!(out, [0x41, 0x42, 0xA0, 0xA0, 0xA0, 0xA0]);

        let mut out = [0u8; 2];
        Petscii::from("abcd").write_bytes_with_padding(&mut out, PADDING_BYTE);
        assert_eq!(out, [0x41, 0x42]);
    }

    #[test]
    fn test_split_padded() {
        let field = [0x41, 0xA0, 0x2C, 0x38, 0x2C, 0x31, 0xA0, 0xA0];
        let (name, suffix) = Petscii::split_padded(&field, PADDING_BYTE);
        assert_eq!(name, Petscii::from("a"));
        assert_eq!(suffix, Petscii::from(",8,1"));

        let (name, suffix) = Petscii::split_padded(&[0x41, 0x42], PADDING_BYTE);
        assert_eq!(name, Petscii::from("ab"));
        assert!(suffix.is_empty());
    }

    #[test]
    fn test_display() {
        let p = Petscii::from_bytes(&[0x41, 0x53, 0x43, 0x49, 0x49, 0x20, 0xC1]);
        assert_eq!(p.to_string(), "ascii A");
        assert_eq!(Petscii::from_bytes(&[0x01]).to_escaped_string(), "{$01}");
        assert_eq!(format!("{:4}|", Petscii::from("ab")), "ab  |");
    }
}
