//! tar.gz bundle creation and verification
//!
//! A bundle is a flat gzip-compressed tar whose members are named after the
//! rotated files they hold. Every member is checked against its source by
//! name, length and CRC-32 before the bundle is committed.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::error::{ArchiveError, Result};

/// A rotated file about to be bundled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub crc32: u32,
}

impl SourceFile {
    /// Read `path` once to record its length and checksum
    pub fn inspect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ArchiveError::verify(path, "source has no file name"))?;
        let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
        let (size, crc32) = checksum(BufReader::new(file)).map_err(|e| ArchiveError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
            crc32,
        })
    }

    /// Whether `member` holds exactly this file's content
    pub fn matches(&self, member: &BundleMember) -> bool {
        self.name == member.name && self.size == member.size && self.crc32 == member.crc32
    }
}

/// A member read back from a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMember {
    pub name: String,
    pub size: u64,
    pub crc32: u32,
}

/// Write `sources` into a new bundle at `output`, then fsync it
pub fn write_bundle(sources: &[SourceFile], output: &Path, level: u32) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .map_err(|e| ArchiveError::io(output, e))?;

    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut builder = Builder::new(encoder);

    for source in sources {
        let mut file = File::open(&source.path).map_err(|e| ArchiveError::io(&source.path, e))?;
        builder
            .append_file(&source.name, &mut file)
            .map_err(|e| ArchiveError::io(&source.path, e))?;
    }

    let encoder = builder.into_inner().map_err(|e| ArchiveError::io(output, e))?;
    let writer = encoder.finish().map_err(|e| ArchiveError::io(output, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| ArchiveError::io(output, e.into_error()))?;
    file.sync_all().map_err(|e| ArchiveError::io(output, e))?;

    Ok(())
}

/// Decompress `bundle` completely and return its members.
///
/// Reading to the end of the gzip stream also checks the gzip trailer CRC.
pub fn read_members(bundle: &Path) -> Result<Vec<BundleMember>> {
    let file = File::open(bundle).map_err(|e| ArchiveError::io(bundle, e))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut members = Vec::new();
    for entry in archive.entries().map_err(|e| ArchiveError::io(bundle, e))? {
        let mut entry = entry.map_err(|e| ArchiveError::io(bundle, e))?;
        let name = entry
            .path()
            .map_err(|e| ArchiveError::io(bundle, e))?
            .to_string_lossy()
            .to_string();
        let declared = entry.header().size().map_err(|e| ArchiveError::io(bundle, e))?;
        let (size, crc32) = checksum(&mut entry).map_err(|e| ArchiveError::io(bundle, e))?;
        if size != declared {
            return Err(ArchiveError::verify(
                bundle,
                format!("member {} is truncated ({} of {} bytes)", name, size, declared),
            ));
        }
        members.push(BundleMember { name, size, crc32 });
    }

    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink()).map_err(|e| ArchiveError::io(bundle, e))?;

    Ok(members)
}

/// Check that `bundle` holds exactly `sources`, in order
pub fn verify_bundle(bundle: &Path, sources: &[SourceFile]) -> Result<()> {
    let members = read_members(bundle)?;
    if members.len() != sources.len() {
        return Err(ArchiveError::verify(
            bundle,
            format!("expected {} members, found {}", sources.len(), members.len()),
        ));
    }

    for (source, member) in sources.iter().zip(&members) {
        if !source.matches(member) {
            return Err(ArchiveError::verify(
                bundle,
                format!(
                    "member {} ({} bytes, crc {:08x}) does not match {} ({} bytes, crc {:08x})",
                    member.name, member.size, member.crc32, source.name, source.size, source.crc32
                ),
            ));
        }
    }

    Ok(())
}

/// fsync a directory so a rename inside it is durable
pub fn fsync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir).map_err(|e| ArchiveError::io(dir, e))?;
    handle.sync_all().map_err(|e| ArchiveError::io(dir, e))
}

/// Delete a partial bundle if it exists
pub fn cleanup_partial_bundle(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}

fn checksum<R: Read>(mut reader: R) -> io::Result<(u64, u32)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((total, hasher.finalize()))
}
