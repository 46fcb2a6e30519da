use {
    crate::Error,
    nodecrypt_protocol::{AesKey, credentials::KEY_LENGTH},
    rand::CryptoRng,
    std::fmt,
};

pub const NONCE_LENGTH: usize = 8;
pub const MAC_LENGTH: usize = 8;
/// Length of a file's full key: nonce, expected MAC and content key.
pub const FULL_KEY_LENGTH: usize = NONCE_LENGTH + MAC_LENGTH + KEY_LENGTH;

/// Per-file key material carried by a file node's 32-byte full key.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKeyMaterial {
    pub nonce: [u8; NONCE_LENGTH],
    /// Content authentication code of the file body.
    pub mac: [u8; MAC_LENGTH],
    pub content_key: AesKey,
}

impl FileKeyMaterial {
    /// Fresh random nonce and content key. The MAC is zero until the body is encrypted.
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::rng())
    }

    #[inline]
    pub fn generate_with_rng<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut nonce = [0; NONCE_LENGTH];
        rng.fill_bytes(&mut nonce);
        Self {
            nonce,
            mac: [0; MAC_LENGTH],
            content_key: AesKey::generate_with_rng(rng),
        }
    }

    /// Splits a full key at 0..8 (nonce), 8..16 (MAC) and 16..32 (content key).
    #[inline]
    pub fn split(full_key: &[u8]) -> Result<Self, Error> {
        let full_key = <&[u8; FULL_KEY_LENGTH]>::try_from(full_key).map_err(|_| {
            Error::KeyLength {
                actual: full_key.len(),
                expected: FULL_KEY_LENGTH,
            }
        })?;
        let (nonce, rest) = full_key.split_at(NONCE_LENGTH);
        let (mac, content_key) = rest.split_at(MAC_LENGTH);
        Ok(Self {
            nonce: nonce.try_into().map_err(Error::malformed)?,
            mac: mac.try_into().map_err(Error::malformed)?,
            content_key: AesKey::try_from(content_key).map_err(Error::malformed)?,
        })
    }

    #[must_use]
    #[inline]
    pub fn compose(&self) -> [u8; FULL_KEY_LENGTH] {
        let mut full_key = [0; FULL_KEY_LENGTH];
        let (nonce, rest) = full_key.split_at_mut(NONCE_LENGTH);
        let (mac, content_key) = rest.split_at_mut(MAC_LENGTH);
        nonce.copy_from_slice(&self.nonce);
        mac.copy_from_slice(&self.mac);
        content_key.copy_from_slice(self.content_key.as_bytes());
        full_key
    }

    #[must_use]
    #[inline]
    pub fn with_mac(&self, mac: [u8; MAC_LENGTH]) -> Self {
        Self {
            mac,
            ..self.clone()
        }
    }
}

impl fmt::Debug for FileKeyMaterial {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyMaterial").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_offsets() {
        let full_key: Vec<u8> = (0..32).collect();
        let material = FileKeyMaterial::split(&full_key).unwrap();
        assert_eq!(material.nonce, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(material.mac, [8, 9, 10, 11, 12, 13, 14, 15]);
        assert_eq!(
            material.content_key,
            AesKey::from_bytes([16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31])
        );
        assert_eq!(material.compose().to_vec(), full_key);
    }

    #[test]
    fn split_rejects_folder_sized_key() {
        assert_eq!(
            FileKeyMaterial::split(&[0; 16]).unwrap_err(),
            Error::KeyLength {
                actual: 16,
                expected: 32
            }
        );
    }

    #[test]
    fn debug_is_redacted() {
        let material = FileKeyMaterial::generate();
        assert_eq!(format!("{material:?}"), "FileKeyMaterial { .. }");
        assert_eq!(material.mac, [0; MAC_LENGTH]);
        assert_eq!(material.with_mac([1; 8]).mac, [1; 8]);
    }
}
