//! Decrypted node attributes and the fingerprint embedded in them.
//!
//! Fingerprint layout:
//!
//! - 4 CRC values (4 × 32 bits, little endian)
//! - length of the modification time (8 bits), `n <= 8`
//! - modification time in seconds since the Unix epoch (`n` bytes, little endian, leading zero bytes dropped)
//!
//! The whole buffer never exceeds [`FINGERPRINT_MAX_SIZE`] bytes.

use {
    crate::{DateTimeUtc, datetime_from_epoch, encoding},
    anyhow::{Result, bail, ensure},
    serde::{Deserialize, Serialize},
    std::fmt,
};

pub const CRC_COUNT: usize = 4;
pub const CRC_SIZE: usize = CRC_COUNT * size_of::<u32>();
pub const FINGERPRINT_MAX_SIZE: usize = CRC_SIZE + 1 + size_of::<i64>();

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Attributes {
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, fingerprint: Option<&Fingerprint>) -> Self {
        Self {
            name: name.into(),
            fingerprint: fingerprint.map(Fingerprint::to_base64),
        }
    }

    /// Same attributes under a new name.
    #[must_use]
    #[inline]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    #[inline]
    pub fn parsed_fingerprint(&self) -> Result<Option<Fingerprint>> {
        self.fingerprint
            .as_deref()
            .map(Fingerprint::from_base64)
            .transpose()
    }

    #[inline]
    pub fn modification_time(&self) -> Result<Option<DateTimeUtc>> {
        match self.parsed_fingerprint()? {
            Some(fingerprint) => fingerprint.modification_time(),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub crc: [u32; CRC_COUNT],
    pub modified_epoch: Option<i64>,
}

impl Fingerprint {
    #[must_use]
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FINGERPRINT_MAX_SIZE);
        for crc in self.crc {
            buf.extend_from_slice(&crc.to_le_bytes());
        }
        if let Some(epoch) = self.modified_epoch {
            let bytes = epoch.to_le_bytes();
            let significant = bytes
                .iter()
                .rposition(|b| *b != 0)
                .and_then(|pos| bytes.get(..=pos))
                .unwrap_or_default();
            buf.push(u8::try_from(significant.len()).unwrap_or(8));
            buf.extend_from_slice(significant);
        }
        buf
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= CRC_SIZE,
            "fingerprint is too short: {} bytes",
            bytes.len()
        );
        ensure!(
            bytes.len() <= FINGERPRINT_MAX_SIZE,
            "fingerprint is too long: {} bytes",
            bytes.len()
        );
        let (crc_bytes, time_bytes) = bytes.split_at(CRC_SIZE);
        let mut crc = [0; CRC_COUNT];
        for (value, chunk) in crc.iter_mut().zip(crc_bytes.chunks_exact(size_of::<u32>())) {
            *value = u32::from_le_bytes(chunk.try_into()?);
        }
        let modified_epoch = match time_bytes.split_first() {
            None => None,
            Some((&len, rest)) => {
                let len = usize::from(len);
                let Some(significant) = rest.get(..len).filter(|_| len <= size_of::<i64>())
                else {
                    bail!("invalid modification time length: {len}");
                };
                let mut epoch = [0; size_of::<i64>()];
                for (dst, src) in epoch.iter_mut().zip(significant) {
                    *dst = *src;
                }
                Some(i64::from_le_bytes(epoch))
            }
        };
        Ok(Self {
            crc,
            modified_epoch,
        })
    }

    #[must_use]
    #[inline]
    pub fn to_base64(&self) -> String {
        encoding::encode_standard(&self.to_bytes())
    }

    #[inline]
    pub fn from_base64(value: &str) -> Result<Self> {
        Self::from_bytes(&encoding::decode(value)?)
    }

    #[inline]
    pub fn modification_time(&self) -> Result<Option<DateTimeUtc>> {
        self.modified_epoch.map(datetime_from_epoch).transpose()
    }
}

impl fmt::Debug for Fingerprint {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("crc", &hex::encode(self.crc.map(u32::to_le_bytes).concat()))
            .field("modified_epoch", &self.modified_epoch)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "test")]
mod tests {
    use super::*;

    #[test]
    fn timestamp_uses_minimal_bytes() {
        let fingerprint = Fingerprint {
            crc: [1, 2, 3, 4],
            modified_epoch: Some(0x0102_0304),
        };
        let bytes = fingerprint.to_bytes();
        assert_eq!(bytes.len(), CRC_SIZE + 1 + 4);
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[CRC_SIZE..], &[4, 4, 3, 2, 1]);
        assert_eq!(Fingerprint::from_bytes(&bytes).unwrap(), fingerprint);
    }

    #[test]
    fn zero_and_negative_timestamps() {
        for epoch in [0, -1, i64::MAX, i64::MIN] {
            let fingerprint = Fingerprint {
                crc: [0; 4],
                modified_epoch: Some(epoch),
            };
            let bytes = fingerprint.to_bytes();
            assert!(bytes.len() <= FINGERPRINT_MAX_SIZE);
            assert_eq!(Fingerprint::from_bytes(&bytes).unwrap(), fingerprint);
        }
        let zero = Fingerprint {
            crc: [0; 4],
            modified_epoch: Some(0),
        };
        assert_eq!(zero.to_bytes().len(), CRC_SIZE + 1);
    }

    #[test]
    fn rejects_bad_lengths() {
        Fingerprint::from_bytes(&[0; 15]).unwrap_err();
        Fingerprint::from_bytes(&[0; 26]).unwrap_err();
        let mut bytes = vec![0; CRC_SIZE];
        bytes.extend_from_slice(&[9, 1, 1, 1, 1, 1, 1, 1, 1]);
        Fingerprint::from_bytes(&bytes).unwrap_err();
        let mut bytes = vec![0; CRC_SIZE];
        bytes.extend_from_slice(&[3, 1, 1]);
        Fingerprint::from_bytes(&bytes).unwrap_err();
    }

    #[test]
    fn parses_fixed_layout() {
        let mut bytes = Vec::new();
        for crc in [0x0403_0201_u32, 0, u32::MAX, 7] {
            bytes.extend_from_slice(&crc.to_le_bytes());
        }
        bytes.extend_from_slice(&[5, 0x00, 0xf1, 0x53, 0x65, 0x01]);
        let fingerprint = Fingerprint::from_bytes(&bytes).unwrap();
        assert_eq!(fingerprint.crc, [0x0403_0201, 0, u32::MAX, 7]);
        assert_eq!(fingerprint.modified_epoch, Some(0x01_6553_f100));
        assert_eq!(fingerprint.to_bytes(), bytes);

        bytes.truncate(CRC_SIZE);
        let no_time = Fingerprint::from_bytes(&bytes).unwrap();
        assert_eq!(no_time.modified_epoch, None);
        assert_eq!(no_time.to_bytes(), bytes);
        assert!(format!("{no_time:?}").contains("01020304"));

        bytes.push(0);
        assert_eq!(Fingerprint::from_bytes(&bytes).unwrap().modified_epoch, Some(0));
    }

    #[test]
    fn attributes_json() {
        let fingerprint = Fingerprint {
            crc: [5, 6, 7, 8],
            modified_epoch: Some(1_600_000_000),
        };
        let attributes = Attributes::new("report.pdf", Some(&fingerprint));
        let json = serde_json::to_string(&attributes).unwrap();
        assert!(json.starts_with(r#"{"n":"report.pdf","c":""#));
        let parsed: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.parsed_fingerprint().unwrap(), Some(fingerprint));
        assert_eq!(
            parsed.modification_time().unwrap().unwrap().timestamp(),
            1_600_000_000
        );

        let renamed = parsed.renamed("old.pdf");
        assert_eq!(renamed.name, "old.pdf");
        assert_eq!(renamed.fingerprint, parsed.fingerprint);

        let plain = Attributes::new("dir", None);
        assert_eq!(serde_json::to_string(&plain).unwrap(), r#"{"n":"dir"}"#);
        assert_eq!(plain.modification_time().unwrap(), None);
    }
}
