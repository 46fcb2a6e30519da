//! Sparse content fingerprint used by the server to detect unchanged uploads.
//!
//! It is not a cryptographic hash: large files are only sampled.

use {
    byteorder::{ByteOrder, LittleEndian},
    cadd::prelude::IntoType,
    crc32fast::Hasher,
    nodecrypt_protocol::{
        DateTimeUtc, Fingerprint,
        attributes::{CRC_COUNT, CRC_SIZE},
    },
    std::io::{self, Read, Seek, SeekFrom},
};

/// Files up to this size are hashed completely.
const MAX_FULL: u64 = 8192;
/// Size of one sampled block of a large file.
const SAMPLE_SIZE: usize = 4 * CRC_SIZE;
/// Samples per CRC value of a large file. All samples add up to `MAX_FULL` bytes.
const SAMPLES: u64 = 32;
/// Index of the last sample over all four CRC values.
const LAST_SAMPLE: u64 = 4 * SAMPLES - 1;

/// Fingerprint of `source` stamped with `modified`.
///
/// Without a modification time there is no fingerprint.
#[inline]
pub fn compute_fingerprint<R: Read + Seek>(
    source: &mut R,
    modified: Option<DateTimeUtc>,
) -> io::Result<Option<Fingerprint>> {
    let Some(modified) = modified else {
        return Ok(None);
    };
    let length = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(Some(Fingerprint {
        crc: sampled_crc(source, length)?,
        modified_epoch: Some(modified.timestamp()),
    }))
}

/// Four CRC values sampled from the first `length` bytes of `source`.
///
/// The source must be positioned at the start.
#[inline]
pub fn sampled_crc<R: Read + Seek>(source: &mut R, length: u64) -> io::Result<[u32; CRC_COUNT]> {
    let mut crc = [0; CRC_COUNT];
    let len = length.try_into_type::<usize>().map_err(io::Error::other)?;
    if len <= CRC_SIZE {
        // Tiny file: verbatim bytes, zero-padded.
        let mut buf = [0; CRC_SIZE];
        source.read_exact(buf.get_mut(..len).unwrap_or_default())?;
        LittleEndian::read_u32_into(&buf, &mut crc);
    } else if length <= MAX_FULL {
        let mut data = vec![0; len];
        source.read_exact(&mut data)?;
        let mut begin = 0;
        for (i, value) in crc.iter_mut().enumerate() {
            let end = len.saturating_mul(i.saturating_add(1)) / CRC_COUNT;
            *value = stored_crc(data.get(begin..end).unwrap_or_default());
            begin = end;
        }
    } else {
        let mut block = [0; SAMPLE_SIZE];
        let sample_size = block.len().try_into_type::<u64>().map_err(io::Error::other)?;
        let span = u128::from(length.saturating_sub(sample_size));
        let mut index = 0u128;
        for value in &mut crc {
            let mut hasher = Hasher::new();
            for _ in 0..SAMPLES {
                let offset = span.saturating_mul(index) / u128::from(LAST_SAMPLE);
                source.seek(SeekFrom::Start(
                    offset.try_into_type::<u64>().map_err(io::Error::other)?,
                ))?;
                source.read_exact(&mut block)?;
                hasher.update(&block);
                index = index.saturating_add(1);
            }
            *value = hasher.finalize().swap_bytes();
        }
    }
    Ok(crc)
}

/// CRC values are stored with their bytes in big-endian order.
fn stored_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize().swap_bytes()
}

#[cfg(test)]
#[expect(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    reason = "test"
)]
mod tests {
    use {
        super::*,
        nodecrypt_protocol::{attributes::FINGERPRINT_MAX_SIZE, datetime_from_epoch},
        std::io::Cursor,
    };

    fn fingerprint_of(data: &[u8], epoch: i64) -> Fingerprint {
        compute_fingerprint(
            &mut Cursor::new(data),
            Some(datetime_from_epoch(epoch).unwrap()),
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn no_time_no_fingerprint() {
        assert_eq!(
            compute_fingerprint(&mut Cursor::new(b"data"), None).unwrap(),
            None
        );
    }

    #[test]
    fn tiny_file_is_verbatim() {
        let fingerprint = fingerprint_of(b"0123456789", 1_600_000_000);
        let bytes = fingerprint.to_bytes();
        assert_eq!(&bytes[..10], b"0123456789");
        assert_eq!(&bytes[10..CRC_SIZE], &[0; 6]);
        assert_eq!(fingerprint.modified_epoch, Some(1_600_000_000));
        assert!(bytes.len() <= FINGERPRINT_MAX_SIZE);
    }

    #[test]
    fn small_file_regions() {
        let data: Vec<u8> = (0..100).collect();
        let fingerprint = fingerprint_of(&data, 1);
        let expected = crc32fast::hash(&data[..25]);
        assert_eq!(&fingerprint.to_bytes()[..4], &expected.to_be_bytes());
        assert_eq!(
            fingerprint.crc[3],
            crc32fast::hash(&data[75..]).swap_bytes()
        );
    }

    #[test]
    fn known_crc() {
        // Standard CRC-32 check value.
        let mut data = b"123456789".to_vec();
        data.extend_from_slice(&[b'x'; 27]);
        let crc = sampled_crc(&mut Cursor::new(&data), 36).unwrap();
        assert_eq!(crc[0], 0xcbf4_3926_u32.swap_bytes());
    }

    #[test]
    fn large_file_is_deterministic_and_sampled() {
        let data: Vec<u8> = (0..100_000_u32).map(|i| (i * 7 % 256) as u8).collect();
        let first = fingerprint_of(&data, 42);
        assert_eq!(first, fingerprint_of(&data, 42));

        // First sample always starts at offset 0.
        let mut changed = data.clone();
        changed[3] ^= 0xff;
        let second = fingerprint_of(&changed, 42);
        assert_ne!(first.crc[0], second.crc[0]);
        assert_eq!(first.crc[1..], second.crc[1..]);

        // Last sample always covers the end of the file.
        let mut changed = data.clone();
        let last = changed.len() - 1;
        changed[last] ^= 0xff;
        assert_ne!(first.crc[3], fingerprint_of(&changed, 42).crc[3]);
    }

    #[test]
    fn matches_the_sampling_formula() {
        let data: Vec<u8> = (0..20_000_u32).map(|i| (i % 253) as u8).collect();
        let length = data.len();
        let mut hasher = Hasher::new();
        for j in 0..32 {
            let offset = (length - 64) * j / 127;
            hasher.update(&data[offset..offset + 64]);
        }
        let crc = sampled_crc(&mut Cursor::new(&data), length as u64).unwrap();
        assert_eq!(crc[0], hasher.finalize().swap_bytes());
    }
}
