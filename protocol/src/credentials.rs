use {
    crate::encoding,
    anyhow::{Error, format_err},
    rand::CryptoRng,
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        borrow::Cow,
        fmt::{self, Debug, Display},
        str::FromStr,
    },
};

/// Length of every symmetric key in the hierarchy.
pub const KEY_LENGTH: usize = 16;

/// A 16-byte AES-128 key: master key, folder key, content key or shared key.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey([u8; KEY_LENGTH]);

impl AesKey {
    #[must_use]
    #[inline]
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::rng())
    }

    #[inline]
    pub fn generate_with_rng<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut key = [0; KEY_LENGTH];
        rng.fill_bytes(&mut key);
        Self(key)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        encoding::encode(&self.0)
    }
}

impl TryFrom<&[u8]> for AesKey {
    type Error = Error;

    #[inline]
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array = <[u8; KEY_LENGTH]>::try_from(bytes).map_err(|_| {
            format_err!("invalid length; got {}, expected {KEY_LENGTH}", bytes.len())
        })?;
        Ok(Self(array))
    }
}

impl FromStr for AesKey {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(encoding::decode(s)?.as_slice())
    }
}

impl<'de> Deserialize<'de> for AesKey {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for AesKey {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encoding::encode(&self.0).serialize(serializer)
    }
}

impl Debug for AesKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesKey").finish()
    }
}
