use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use memmap::{MmapMut, MmapOptions};

/// Backing storage for disk images.
enum Storage {
    /// A private copy-on-write mapping of a file.  Changes are never
    /// written through to the file; `Image::save()` does that explicitly.
    Mapped(MmapMut),
    Memory(Box<[u8]>),
}

/// Provide backing storage (file or memory) for disk images, along with the
/// location the image was loaded from, if any.
pub struct Image {
    storage: Storage,
    path: Option<PathBuf>,
}

impl Image {
    pub fn from_vec(bytes: Vec<u8>) -> Image {
        Image {
            storage: Storage::Memory(bytes.into_boxed_slice()),
            path: None,
        }
    }

    pub fn open_memory(length: usize) -> Image {
        Self::from_vec(vec![0; length])
    }

    /// Map a file copy-on-write.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Image> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let storage = if file.metadata()?.len() == 0 {
            // Empty files cannot be mapped.
            Storage::Memory(Box::new([]))
        } else {
            Storage::Mapped(unsafe { MmapOptions::new().map_copy(&file)? })
        };
        Ok(Image {
            storage,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.storage {
            Storage::Mapped(ref mmap) => &mmap[..],
            Storage::Memory(ref array) => &array[..],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.storage {
            Storage::Mapped(ref mut mmap) => &mut mmap[..],
            Storage::Memory(ref mut array) => &mut array[..],
        }
    }

    pub fn slice(&self, offset: usize, length: usize) -> Option<&[u8]> {
        self.as_slice().get(offset..offset.checked_add(length)?)
    }

    pub fn slice_mut(&mut self, offset: usize, length: usize) -> Option<&mut [u8]> {
        self.as_mut_slice().get_mut(offset..offset.checked_add(length)?)
    }

    /// Write the buffer verbatim to the location it was loaded from.  Does
    /// nothing for images that have no location.
    pub fn save(&self) -> io::Result<()> {
        match self.path {
            Some(ref path) => self.write_to(path),
            None => Ok(()),
        }
    }

    /// Write the buffer to a new location, which becomes the location used
    /// by subsequent saves.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        self.write_to(path.as_ref())?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    fn write_to(&self, path: &Path) -> io::Result<()> {
        // Take a copy first: unmodified pages of a mapping still refer to the
        // file we may be about to overwrite.
        let bytes = self.as_slice().to_vec();
        // Avoid truncating, which would invalidate those pages until the
        // write completes.
        let mut file = OpenOptions::new().write(true).create(true).open(path)?;
        file.write_all(&bytes)?;
        file.set_len(bytes.len() as u64)?;
        file.flush()?;
        info!("saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_memory_image() {
        let mut image = Image::open_memory(16);
        assert_eq!(image.len(), 16);
        image.slice_mut(4, 2).unwrap().copy_from_slice(&[1, 2]);
        assert_eq!(image.slice(3, 4), Some(&[0u8, 1, 2, 0][..]));
        assert_eq!(image.slice(15, 2), None);
        assert_eq!(image.slice(usize::MAX, 2), None);
        // Nowhere to save to.
        image.save().unwrap();
    }

    #[test]
    fn test_copy_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        fs::write(&path, [7u8; 4096]).unwrap();

        let mut image = Image::open(&path).unwrap();
        image.slice_mut(0, 1).unwrap()[0] = 9;
        // Nothing reaches the file until saved.
        assert_eq!(fs::read(&path).unwrap()[0], 7);
        image.save().unwrap();
        let saved = fs::read(&path).unwrap();
        assert_eq!(saved.len(), 4096);
        assert_eq!(saved[0], 9);
        assert_eq!(saved[1], 7);

        let other = dir.path().join("other.bin");
        image.save_as(&other).unwrap();
        assert_eq!(fs::read(&other).unwrap(), saved);
        // Later saves go to the new location.
        image.slice_mut(1, 1).unwrap()[0] = 5;
        image.save().unwrap();
        assert_eq!(fs::read(&other).unwrap()[1], 5);
        assert_eq!(fs::read(&path).unwrap()[1], 7);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        fs::write(&path, b"").unwrap();
        let image = Image::open(&path).unwrap();
        assert_eq!(image.len(), 0);
    }
}
