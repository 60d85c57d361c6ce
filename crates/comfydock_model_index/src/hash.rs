use std::{
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use sha2::{Digest, Sha256};

use crate::ModelIndexError;

/// Sample size for the short hash, and the file size above which the middle
/// and end of the file are sampled as well.
const CHUNK_SIZE: u64 = 5 * 1024 * 1024;
const MULTI_CHUNK_THRESHOLD: u64 = 30 * 1024 * 1024;

/// Fast sampled fingerprint: blake3 over the decimal file size, the first
/// 5 MiB, and for files above 30 MiB also the middle and last 5 MiB.
/// Sub-second even for multi-gigabyte files, with negligible collision
/// probability over a model library.
pub fn compute_short_hash(path: &Path) -> Result<String, ModelIndexError> {
    if !path.is_file() {
        return Err(ModelIndexError::InvalidFile {
            path: path.to_path_buf(),
        });
    }
    let file_size = fs_err::metadata(path)?.len();

    let mut hasher = blake3::Hasher::new();
    hasher.update(file_size.to_string().as_bytes());

    let mut file = fs_err::File::open(path)?;
    feed_chunk(&mut hasher, &mut file, CHUNK_SIZE)?;

    if file_size > MULTI_CHUNK_THRESHOLD {
        file.seek(SeekFrom::Start(file_size / 2 - CHUNK_SIZE / 2))?;
        feed_chunk(&mut hasher, &mut file, CHUNK_SIZE)?;

        file.seek(SeekFrom::End(-(CHUNK_SIZE as i64)))?;
        feed_chunk(&mut hasher, &mut file, CHUNK_SIZE)?;
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Full blake3 digest, streamed. Only needed when a short-hash collision is
/// suspected or when exporting.
pub fn compute_blake3(path: &Path) -> Result<String, ModelIndexError> {
    let mut hasher = blake3::Hasher::new();
    let mut file = fs_err::File::open(path)?;
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// SHA-256 digest, streamed. Kept for compatibility with external model
/// hosts which publish SHA-256 checksums.
pub fn compute_sha256(path: &Path) -> Result<String, ModelIndexError> {
    let mut hasher = Sha256::new();
    let mut file = fs_err::File::open(path)?;
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn feed_chunk(
    hasher: &mut blake3::Hasher,
    file: &mut fs_err::File,
    limit: u64,
) -> Result<(), ModelIndexError> {
    let mut remaining = limit;
    let mut buffer = vec![0u8; 1024 * 1024];
    while remaining > 0 {
        let want = buffer.len().min(remaining as usize);
        let read = file.read(&mut buffer[..want])?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        remaining -= read as u64;
    }
    Ok(())
}
