use {
    crate::Error,
    aes::{
        Aes128, Block,
        cipher::{
            BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
            block_padding::NoPadding, generic_array::GenericArray,
        },
    },
    nodecrypt_protocol::{AesKey, Attributes, encoding},
};

pub const BLOCK_SIZE: usize = 16;

/// Prefix of every decrypted attribute blob. A wrong key never yields it.
const ATTRIBUTES_MARKER: &[u8] = b"MEGA";

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128 under one key: raw blocks, key wrapping and attribute blobs.
#[derive(Clone)]
pub struct Cipher {
    key: AesKey,
    inner: Aes128,
}

impl Cipher {
    #[must_use]
    #[inline]
    pub fn new(key: &AesKey) -> Self {
        Self {
            inner: Aes128::new(GenericArray::from_slice(key.as_bytes())),
            key: key.clone(),
        }
    }

    #[must_use]
    #[inline]
    pub fn encrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut block = Block::clone_from_slice(block);
        self.inner.encrypt_block(&mut block);
        to_array(&block)
    }

    #[must_use]
    #[inline]
    pub fn decrypt_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut block = Block::clone_from_slice(block);
        self.inner.decrypt_block(&mut block);
        to_array(&block)
    }

    /// Encrypts a 16- or 32-byte key, block by block.
    #[inline]
    pub fn wrap_key(&self, plain: &[u8]) -> Result<Vec<u8>, Error> {
        check_key_blob_length(plain)?;
        let mut output = Vec::with_capacity(plain.len());
        for chunk in plain.chunks_exact(BLOCK_SIZE) {
            let mut block = Block::clone_from_slice(chunk);
            self.inner.encrypt_block(&mut block);
            output.extend_from_slice(&block);
        }
        Ok(output)
    }

    #[inline]
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, Error> {
        check_key_blob_length(wrapped)?;
        let mut output = Vec::with_capacity(wrapped.len());
        for chunk in wrapped.chunks_exact(BLOCK_SIZE) {
            let mut block = Block::clone_from_slice(chunk);
            self.inner.decrypt_block(&mut block);
            output.extend_from_slice(&block);
        }
        Ok(output)
    }

    /// Unwraps a blob that must hold exactly one 16-byte key.
    #[inline]
    pub fn unwrap_aes_key(&self, wrapped: &[u8]) -> Result<AesKey, Error> {
        let plain = self.unwrap_key(wrapped)?;
        AesKey::try_from(plain.as_slice()).map_err(|_| Error::KeyLength {
            actual: plain.len(),
            expected: BLOCK_SIZE,
        })
    }

    /// Encrypts attributes into their base64 wire form.
    #[inline]
    pub fn encrypt_attributes(&self, attributes: &Attributes) -> Result<String, Error> {
        let mut data = ATTRIBUTES_MARKER.to_vec();
        serde_json::to_writer(&mut data, attributes).map_err(|err| Error::Attributes {
            reason: err.to_string(),
        })?;
        data.resize(data.len().next_multiple_of(BLOCK_SIZE), 0);
        let ciphertext = Aes128CbcEnc::new(
            GenericArray::from_slice(self.key.as_bytes()),
            &GenericArray::default(),
        )
        .encrypt_padded_vec_mut::<NoPadding>(&data);
        Ok(encoding::encode(&ciphertext))
    }

    #[inline]
    pub fn decrypt_attributes(&self, encoded: &str) -> Result<Attributes, Error> {
        let ciphertext = encoding::decode(encoded).map_err(|err| Error::Attributes {
            reason: format!("{err:#}"),
        })?;
        let mut plaintext = Aes128CbcDec::new(
            GenericArray::from_slice(self.key.as_bytes()),
            &GenericArray::default(),
        )
        .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
        .map_err(|_| Error::Attributes {
            reason: format!("length {} is not a multiple of the block size", ciphertext.len()),
        })?;
        let end = plaintext
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |pos| pos.saturating_add(1));
        plaintext.truncate(end);
        let json = plaintext
            .strip_prefix(ATTRIBUTES_MARKER)
            .ok_or_else(|| Error::Attributes {
                reason: "missing marker, wrong key".to_owned(),
            })?;
        serde_json::from_slice(json).map_err(|err| Error::Attributes {
            reason: err.to_string(),
        })
    }
}

fn to_array(block: &Block) -> [u8; BLOCK_SIZE] {
    let mut output = [0; BLOCK_SIZE];
    output.copy_from_slice(block);
    output
}

fn check_key_blob_length(data: &[u8]) -> Result<(), Error> {
    match data.len() {
        16 | 32 => Ok(()),
        actual => Err(Error::KeyLength {
            actual,
            expected: if actual < 32 { 16 } else { 32 },
        }),
    }
}
