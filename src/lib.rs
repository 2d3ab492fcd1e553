//! This is a Rust library for reading the floppy disk images of Commodore
//! Business Machines (CBM) computers, from the PET through the Commodore 128.
//!
//! Features:
//!
//! * Raw sector images of the 1541 (D64, including 40 and 42 track
//!   variants), 1571 (D71), 1581 (D81), 8050 (D80), and 8250 (D82) drives,
//!   and of CMD FD2000/FD4000 media (D1M, D2M, D4M), with or without a
//!   trailing error table.  The layout is identified from the file size.
//! * GCR flux images (G64, G71), decoded from the raw bit cells a drive
//!   would see, one half-track at a time as blocks are requested.
//! * A single `DiskImage` trait over both, providing block access along with
//!   directory listings, file contents, and free block counts reconstructed
//!   from the CBM DOS structures on the disk.
//! * Creation of blank, formatted 1541, 1571, and 1581 images.
//! * Conversion of 5.25" sector images to G64/G71 flux.
//! * Conversion between Petscii and Unicode.
//! * A sample `cdisk` program for inspecting disk images from the command
//!   line.
//!
//! Old disk images are frequently damaged, and the library is tolerant of
//! that.  Blocks that are out of range or that can't be decoded are simply
//! `None`, and a directory or file chain that loops back on itself ends
//! where the loop begins instead of hanging the caller.
//!
//! # Example
//!
//! The following example creates a blank 1541 disk image and lists its
//! (empty) directory:
//!
//! ```
//! use cbmimage::disk::{DiskImage, MediaType, RawSectorImage};
//!
//! let disk = RawSectorImage::create(
//!     MediaType::FiveInchSingleSided,
//!     &"games".into(),
//!     &"01".into(),
//! )
//! .unwrap();
//! let directory = disk.read_directory();
//! assert!(directory.entries.is_empty());
//! assert_eq!(directory.free_blocks, Some(664));
//! println!("{}", directory);
//! ```
//!
//! For more examples, see the accompanying `cdisk` program:
//!
//! ```text
//! cdisk GAMES.G64 dir
//! 0 "games           " 01 2a
//! 6    "ascii codes"      prg
//! 658 blocks free.
//! ```
//!
//! # Design of disk image access
//!
//! Support for disk images was built using a layered scheme:
//!
//! 1. `Image` provides access to the underlying storage containing the disk
//!    image -- either a copy-on-write mapping of a disk image file or an
//!    in-memory array.
//! 2. `DiskLayout` divides a sector image into tracks and sectors according
//!    to the speed zones of a particular drive.  GCR images instead find
//!    their sectors by decoding the flux of each track.
//! 3. The `DiskImage` trait exposes block access for both kinds of image,
//!    and implements the directory, BAM, and file chain algorithms once on
//!    top of it.
//!
//! Flux images are read-only: writing a block would mean re-encoding the
//! track, which is not supported.
//!
//! # License
//!
//! Cbmimage is distributed under the terms of both the MIT license and the
//! Apache License (Version 2.0).

pub mod disk;

mod petscii;
mod util;

pub use crate::petscii::Petscii;
