use {
    super::{
        chunks::chunk_boundaries,
        cipher::{BLOCK_SIZE, Cipher},
        file_key::{MAC_LENGTH, NONCE_LENGTH},
    },
    byteorder::{BigEndian, ByteOrder},
    cadd::{ops::Cadd, prelude::IntoType},
    nodecrypt_protocol::AesKey,
    std::io,
};

/// Which side of the stream is plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input is plaintext, output is ciphertext.
    Encrypt,
    /// Input is ciphertext, output is plaintext.
    Decrypt,
}

/// Forward-only counter mode cipher with a chained chunk MAC.
///
/// Every 16-byte block is XORed with `AES(nonce || counter)`. The plaintext
/// of each block is folded into a chunk MAC, and every finished chunk MAC is
/// folded into the file MAC. Chunks follow [`chunk_boundaries`].
pub struct CtrMac {
    cipher: Cipher,
    nonce: [u8; NONCE_LENGTH],
    direction: Direction,
    length: u64,
    position: u64,
    counter: u64,
    boundaries: Vec<u64>,
    next_boundary: usize,
    chunk_mac: [u8; BLOCK_SIZE],
    file_mac: [u8; BLOCK_SIZE],
}

impl CtrMac {
    #[must_use]
    #[inline]
    pub fn new(
        key: &AesKey,
        nonce: [u8; NONCE_LENGTH],
        length: u64,
        direction: Direction,
    ) -> Self {
        Self {
            cipher: Cipher::new(key),
            nonce,
            direction,
            length,
            position: 0,
            counter: 0,
            boundaries: chunk_boundaries(length),
            next_boundary: 0,
            chunk_mac: doubled(nonce),
            file_mac: [0; BLOCK_SIZE],
        }
    }

    #[must_use]
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    #[must_use]
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.position >= self.length
    }

    #[must_use]
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Size of the next block: 16 bytes, or less for the tail of the stream.
    #[must_use]
    #[inline]
    pub fn next_block_len(&self) -> usize {
        let remaining = self.length.saturating_sub(self.position);
        remaining
            .try_into_type::<usize>()
            .map_or(BLOCK_SIZE, |remaining| remaining.min(BLOCK_SIZE))
    }

    /// Transforms the next block of the stream in place.
    ///
    /// `block` must be exactly [`CtrMac::next_block_len`] bytes long.
    #[inline]
    pub fn apply(&mut self, block: &mut [u8]) -> io::Result<()> {
        if block.is_empty() || block.len() != self.next_block_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "invalid block length {} at position {}",
                    block.len(),
                    self.position
                ),
            ));
        }
        if self.boundaries.get(self.next_boundary) == Some(&self.position) {
            if self.position != 0 {
                self.fold_chunk();
            }
            self.chunk_mac = doubled(self.nonce);
            self.next_boundary = self.next_boundary.saturating_add(1);
        }

        let mut counter_block = [0; BLOCK_SIZE];
        let (nonce, counter) = counter_block.split_at_mut(NONCE_LENGTH);
        nonce.copy_from_slice(&self.nonce);
        BigEndian::write_u64(counter, self.counter);
        self.counter = self.counter.wrapping_add(1);
        let keystream = self.cipher.encrypt_block(&counter_block);

        if self.direction == Direction::Encrypt {
            self.fold_block(block);
        }
        for (byte, key) in block.iter_mut().zip(keystream) {
            *byte ^= key;
        }
        if self.direction == Direction::Decrypt {
            self.fold_block(block);
        }

        let advance = block.len().try_into_type::<u64>().map_err(io::Error::other)?;
        self.position = self.position.cadd(advance).map_err(io::Error::other)?;
        Ok(())
    }

    /// Content authentication code, available once the whole stream is processed.
    ///
    /// An empty stream has no blocks to fold; its code is all zeros.
    #[must_use]
    #[inline]
    pub fn mac(&self) -> Option<[u8; MAC_LENGTH]> {
        if !self.is_finished() {
            return None;
        }
        if self.length == 0 {
            return Some([0; MAC_LENGTH]);
        }
        let mut file_mac = self.file_mac;
        fold(&self.cipher, &mut file_mac, &self.chunk_mac);
        let (low, high) = file_mac.split_at(8);
        let mut mac = [0; MAC_LENGTH];
        let (first, second) = mac.split_at_mut(4);
        for (i, byte) in first.iter_mut().enumerate() {
            *byte = xor_at(low, i, i.saturating_add(4));
        }
        for (i, byte) in second.iter_mut().enumerate() {
            *byte = xor_at(high, i, i.saturating_add(4));
        }
        Some(mac)
    }

    fn fold_block(&mut self, plaintext: &[u8]) {
        for (mac, byte) in self.chunk_mac.iter_mut().zip(plaintext) {
            *mac ^= byte;
        }
        self.chunk_mac = self.cipher.encrypt_block(&self.chunk_mac);
    }

    fn fold_chunk(&mut self) {
        fold(&self.cipher, &mut self.file_mac, &self.chunk_mac);
    }
}

fn fold(cipher: &Cipher, file_mac: &mut [u8; BLOCK_SIZE], chunk_mac: &[u8; BLOCK_SIZE]) {
    for (mac, byte) in file_mac.iter_mut().zip(chunk_mac) {
        *mac ^= byte;
    }
    *file_mac = cipher.encrypt_block(file_mac);
}

fn doubled(nonce: [u8; NONCE_LENGTH]) -> [u8; BLOCK_SIZE] {
    let mut block = [0; BLOCK_SIZE];
    let (first, second) = block.split_at_mut(NONCE_LENGTH);
    first.copy_from_slice(&nonce);
    second.copy_from_slice(&nonce);
    block
}

fn xor_at(half: &[u8], a: usize, b: usize) -> u8 {
    half.get(a).copied().unwrap_or_default() ^ half.get(b).copied().unwrap_or_default()
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
    use super::*;

    fn process(state: &mut CtrMac, data: &mut [u8]) {
        let mut offset = 0;
        while !state.is_finished() {
            let len = state.next_block_len();
            state.apply(&mut data[offset..offset + len]).unwrap();
            offset += len;
        }
    }

    #[test]
    fn empty_stream_mac_is_zero() {
        let state = CtrMac::new(&AesKey::from_bytes([0; 16]), [0; 8], 0, Direction::Encrypt);
        assert_eq!(state.mac(), Some([0; 8]));
        let state = CtrMac::new(&AesKey::from_bytes([3; 16]), [9; 8], 0, Direction::Decrypt);
        assert_eq!(state.mac(), Some([0; 8]));
    }

    #[test]
    fn known_mac_across_first_boundary() {
        let key = AesKey::from_bytes(std::array::from_fn(|i| i as u8));
        let length = 128 * 1024 + 41;
        let mut data: Vec<u8> = (0..length).map(|i| (i * 31 % 253) as u8).collect();
        let mut state = CtrMac::new(&key, [7; 8], length as u64, Direction::Encrypt);
        assert_eq!(state.chunk_count(), 2);
        process(&mut state, &mut data);
        assert_eq!(hex::encode(state.mac().unwrap()), "56cc8df4156e82b3");
        assert_eq!(crc32fast::hash(&data), 0x8d58_e9b7);
    }

    #[test]
    fn first_block_uses_counter_zero() {
        let mut state = CtrMac::new(&AesKey::from_bytes([0; 16]), [0; 8], 16, Direction::Encrypt);
        let mut block = [0; 16];
        state.apply(&mut block).unwrap();
        assert_eq!(hex::encode(block), "66e94bd4ef8a2c3b884cfa59ca342b2e");
        assert!(state.is_finished());
    }

    #[test]
    fn rejects_wrong_block_length() {
        let mut state = CtrMac::new(&AesKey::from_bytes([0; 16]), [0; 8], 20, Direction::Encrypt);
        state.apply(&mut [0; 8]).unwrap_err();
        state.apply(&mut [0; 16]).unwrap();
        state.apply(&mut [0; 16]).unwrap_err();
        state.apply(&mut [0; 4]).unwrap();
        assert!(state.mac().is_some());
    }

    #[test]
    fn mac_is_unavailable_mid_stream() {
        let mut state = CtrMac::new(&AesKey::from_bytes([1; 16]), [2; 8], 40, Direction::Encrypt);
        state.apply(&mut [0; 16]).unwrap();
        assert_eq!(state.mac(), None);
    }

    #[test]
    fn directions_agree() {
        let key = AesKey::from_bytes([4; 16]);
        let nonce = [5; 8];
        let length = 400 * 1024 + 3;
        let original: Vec<u8> = (0..length).map(|i| (i % 251) as u8).collect();

        let mut data = original.clone();
        let mut encryptor = CtrMac::new(&key, nonce, length as u64, Direction::Encrypt);
        assert_eq!(encryptor.chunk_count(), 3);
        process(&mut encryptor, &mut data);
        assert_ne!(data, original);

        let mut decryptor = CtrMac::new(&key, nonce, length as u64, Direction::Decrypt);
        process(&mut decryptor, &mut data);
        assert_eq!(data, original);
        assert_eq!(encryptor.mac(), decryptor.mac());
    }
}
