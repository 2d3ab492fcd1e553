use clap::{App, AppSettings, Arg, SubCommand};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::process;

use cbmimage::disk::bam;
use cbmimage::disk::block;
use cbmimage::disk::{
    self, DiskImage, GcrImage, GcrOptions, ImageKind, Location, MediaType,
    RawSectorImage,
};
use cbmimage::Petscii;

// Possible exit codes
static _EXIT_SUCCESS: i32 = 0;
static EXIT_FAILURE: i32 = 1;

/// If a dash is specified for a filename, this indicates that the user wants
/// to write to standard output.
static STDOUT_PSEUDOFILENAME: &str = "-";

fn main() {
    // Parse command-line arguments
    let app = App::new("Commodore Disk Image Utility")
        .version("0.1.0")
        .about("Inspect Commodore D64/D71/D81/D80/D82/DxM and G64/G71 disk images.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("diskimage").required(true))
        .arg(
            Arg::with_name("verify-checksums")
                .long("verify-checksums")
                .help("Reject GCR data blocks with bad checksums"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Show more detail"),
        )
        .subcommand(SubCommand::with_name("dir").about("Show a directory listing"))
        .subcommand(SubCommand::with_name("free").about("Show the number of free blocks"))
        .subcommand(
            SubCommand::with_name("bam").about("Show the free sector count of each track"),
        )
        .subcommand(
            SubCommand::with_name("read")
                .about("Read a file from a disk image.")
                .arg(Arg::with_name("source_filename").required(true))
                .arg(Arg::with_name("destination_filename").required(false)),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a blank disk image")
                .arg(Arg::with_name("name").default_value("blank"))
                .arg(Arg::with_name("id").default_value("00")),
        )
        .subcommand(
            SubCommand::with_name("block")
                .about("Provide a hex dump of a block.")
                .arg(
                    Arg::with_name("track")
                        .validator(u8_validator)
                        .required(true),
                )
                .arg(
                    Arg::with_name("sector")
                        .validator(u8_validator)
                        .required(true),
                ),
        )
        .subcommand(SubCommand::with_name("dump").about("Provide a hex dump of a disk image."))
        .subcommand(SubCommand::with_name("info").about("Describe a disk image."))
        .subcommand(
            SubCommand::with_name("convert")
                .about("Convert a D64/D71 disk image into a G64/G71 flux image.")
                .arg(Arg::with_name("destination_filename").required(true)),
        );

    let mut app_clone = app.clone();
    let matches = app.get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let diskimage = matches.value_of("diskimage").unwrap();
    let options =
        GcrOptions::new().with_verify_data_checksum(matches.is_present("verify-checksums"));
    let verbosity = matches.occurrences_of("verbose");
    let result = match matches.subcommand() {
        ("dir", Some(_)) => cmd_dir(diskimage, options, verbosity),
        ("free", Some(_)) => cmd_free(diskimage, options),
        ("bam", Some(_)) => cmd_bam(diskimage, options),
        ("read", Some(m)) => cmd_read(
            diskimage,
            options,
            m.value_of("source_filename").unwrap(),
            m.value_of("destination_filename"),
        ),
        ("create", Some(m)) => cmd_create(
            diskimage,
            m.value_of("name").unwrap(),
            m.value_of("id").unwrap(),
        ),
        ("block", Some(m)) => cmd_block(
            diskimage,
            options,
            u8_parser(m.value_of("track").unwrap()),
            u8_parser(m.value_of("sector").unwrap()),
        ),
        ("dump", Some(_)) => cmd_dump(diskimage, options),
        ("info", Some(_)) => cmd_info(diskimage, options),
        ("convert", Some(m)) => cmd_convert(diskimage, m.value_of("destination_filename").unwrap()),
        _ => {
            app_clone.print_help().unwrap();
            println!();
            process::exit(EXIT_FAILURE);
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(EXIT_FAILURE);
    }
}

fn u8_validator(v: String) -> Result<(), String> {
    match v.parse::<u8>() {
        Ok(_) => Ok(()),
        Err(_) => Err("Expected a value from 0-255.".to_string()),
    }
}

fn u8_parser(v: &str) -> u8 {
    v.parse::<u8>().unwrap()
}

fn not_found(what: String) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, what)
}

/// Open a file for writing
fn open_fs_writer(filename: &str) -> io::Result<Box<dyn Write>> {
    if filename == STDOUT_PSEUDOFILENAME {
        Ok(Box::new(io::stdout()))
    } else {
        Ok(Box::new(fs::File::create(filename)?))
    }
}

fn cmd_dir(diskimage: &str, options: GcrOptions, verbosity: u64) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    let directory = disk.read_directory();
    if verbosity > 0 {
        println!("{:#}", directory);
    } else {
        println!("{}", directory);
    }
    Ok(())
}

fn cmd_free(diskimage: &str, options: GcrOptions) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    match disk.read_free_blocks() {
        Some(free) => println!("{} blocks free.", free),
        None => println!("The free block count is not available for {} media.", disk.media_type()),
    }
    Ok(())
}

fn cmd_bam(diskimage: &str, options: GcrOptions) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    let counts = bam::free_counts(&*disk)
        .ok_or_else(|| not_found(format!("no readable BAM on {} media", disk.media_type())))?;
    for (track, free) in counts {
        println!("{:2}: {:2}/{:2}", track, free, disk.sectors_in_track(track));
    }
    Ok(())
}

fn cmd_read(
    diskimage: &str,
    options: GcrOptions,
    source_filename: &str,
    destination_filename: Option<&str>,
) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    let name: Petscii = source_filename.into();
    let entry = disk
        .find_entry(&name)
        .ok_or_else(|| not_found(format!("\"{}\" not found", source_filename)))?;
    let contents = disk
        .read_entry(&entry)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("\"{}\" has a broken block chain", source_filename),
            )
        })?;
    let destination_filename = destination_filename.unwrap_or(source_filename);
    let mut writer = open_fs_writer(destination_filename)?;
    writer.write_all(&contents)?;
    writer.flush()?;
    Ok(())
}

fn cmd_create(diskimage: &str, name: &str, id: &str) -> io::Result<()> {
    // Determine what kind of disk image to create based on the file extension.
    let media_type = match disk::media_type_from_extension(diskimage) {
        Some(media_type) => media_type,
        None => {
            println!("Unknown file extension.  Assuming D64...");
            MediaType::FiveInchSingleSided
        }
    };
    let mut image = RawSectorImage::create(media_type, &name.into(), &id.into()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} media cannot be formatted", media_type),
        )
    })?;

    // Refuse to overwrite an existing file.
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(diskimage)?;
    image.save_as(diskimage)
}

fn cmd_block(diskimage: &str, options: GcrOptions, track: u8, sector: u8) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    block::dump_block(&*disk, Location(track, sector), &mut io::stdout())?;
    io::stdout().flush()?;
    Ok(())
}

fn cmd_dump(diskimage: &str, options: GcrOptions) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    block::dump(&*disk, &mut io::stdout())?;
    io::stdout().flush()?;
    Ok(())
}

fn cmd_info(diskimage: &str, options: GcrOptions) -> io::Result<()> {
    let disk = disk::open_with_options(diskimage, options)?;
    println!("Media: {}", disk.media_type());
    println!("Tracks: {}", disk.track_count());
    println!(
        "Directory: {}",
        Location(disk.directory_track(), disk.directory_sector())
    );
    match disk.disk_id() {
        Some(id) => println!("ID: {}", Petscii::from_bytes(&id)),
        None => println!("ID: unknown"),
    }
    let readable = block::LocationIterator::new(&*disk)
        .filter(|l| disk.get_block(l.0, l.1).is_some())
        .count();
    let total = block::LocationIterator::new(&*disk).count();
    println!("Readable blocks: {}/{}", readable, total);
    Ok(())
}

fn cmd_convert(diskimage: &str, destination_filename: &str) -> io::Result<()> {
    if ImageKind::from_extension(destination_filename) != Some(ImageKind::Gxx) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "the destination must be a .g64 or .g71 file",
        ));
    }
    let source = RawSectorImage::open(diskimage)?;
    let mut flux = GcrImage::from_sector_image(&source).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} media cannot be converted to GCR", source.media_type()),
        )
    })?;
    flux.save_as(destination_filename)
}
