use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::Error;

const CHUNK_SIZE: usize = 64 * 1024;
const BYTES_IN_MB: f64 = 1024.0 * 1024.0;

/// Hex BLAKE3 digest of everything `reader` yields, read in fixed chunks.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> Result<String, Error> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

pub fn fingerprint_file<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    fingerprint_reader(File::open(path)?)
}

pub fn file_size_mb<P: AsRef<Path>>(path: P) -> Result<f64, Error> {
    Ok(std::fs::metadata(path)?.len() as f64 / BYTES_IN_MB)
}

/// Rejects files above `max_mb`, returns the size otherwise.
pub fn check_size<P: AsRef<Path>>(path: P, max_mb: u64) -> Result<f64, Error> {
    let size_mb = file_size_mb(path)?;
    if size_mb > max_mb as f64 {
        return Err(Error::FileTooLarge { size_mb, max_mb });
    }
    Ok(size_mb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_matches_one_shot_hash_across_chunks() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = fingerprint_reader(&data[..]).unwrap();
        assert_eq!(streamed, blake3::hash(&data).to_hex().to_string());
        assert_eq!(streamed.len(), 64);
    }

    #[test]
    fn different_content_gives_different_fingerprints() {
        assert_ne!(
            fingerprint_reader(&b"frame-a"[..]).unwrap(),
            fingerprint_reader(&b"frame-b"[..]).unwrap()
        );
    }

    #[test]
    fn oversized_files_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 2 * 1024 * 1024 + 1]).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            check_size(file.path(), 2),
            Err(Error::FileTooLarge { max_mb: 2, .. })
        ));
        assert!(check_size(file.path(), 3).is_ok());
    }
}
