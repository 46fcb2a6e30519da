use {
    super::{
        cipher::BLOCK_SIZE,
        ctr_mac::{CtrMac, Direction},
        file_key::{FileKeyMaterial, MAC_LENGTH},
    },
    crate::{Error, cancel::CancellationToken},
    cadd::ops::Cadd,
    fs_err::File,
    std::{
        io::{self, BufReader, Read, Seek, SeekFrom, Write},
        path::Path,
    },
    tempfile::SpooledTempFile,
    tracing::{debug, warn},
};

/// Max size of encrypted file content that will be stored in memory.
/// Files exceeding this limit will be stored as a temporary file on disk.
pub const DEFAULT_MAX_IN_MEMORY: usize = 32 * 1024 * 1024;

/// Shared read loop of both stream directions.
struct Stream<R> {
    source: R,
    state: CtrMac,
    material: FileKeyMaterial,
    // Holds source bytes of the block being gathered, then the
    // transformed bytes until the caller has taken all of them.
    block: [u8; BLOCK_SIZE],
    filled: usize,
    out_start: usize,
    out_end: usize,
    delivered: u64,
    cancel: Option<CancellationToken>,
    failure: Option<Error>,
    mac: Option<[u8; MAC_LENGTH]>,
}

impl<R: Read> Stream<R> {
    fn new(source: R, length: u64, material: &FileKeyMaterial, direction: Direction) -> Self {
        Self {
            source,
            state: CtrMac::new(&material.content_key, material.nonce, length, direction),
            material: material.clone(),
            block: [0; BLOCK_SIZE],
            filled: 0,
            out_start: 0,
            out_end: 0,
            delivered: 0,
            cancel: None,
            failure: None,
            mac: None,
        }
    }

    fn check_cancelled(&mut self) -> Result<(), Error> {
        if let Some(token) = &self.cancel
            && token.is_cancelled()
        {
            // Partial chunk MAC state is dropped for good.
            self.failure = Some(Error::Cancelled);
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.failure {
            return Err(err.clone().into());
        }
        self.check_cancelled()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        while let Some(output) = buf.get_mut(written..).filter(|rest| !rest.is_empty()) {
            if self.out_start < self.out_end {
                let available = self.block.get(self.out_start..self.out_end).unwrap_or_default();
                let len = available.len().min(output.len());
                if let (Some(dst), Some(src)) = (output.get_mut(..len), available.get(..len)) {
                    dst.copy_from_slice(src);
                }
                self.out_start = self.out_start.cadd(len).map_err(io::Error::other)?;
                written = written.cadd(len).map_err(io::Error::other)?;
                continue;
            }
            if self.state.is_finished() {
                break;
            }
            self.check_cancelled()?;
            self.next_block()?;
        }
        if self.state.is_finished() && self.mac.is_none() {
            self.finish()?;
        }
        let advance = u64::try_from(written).map_err(io::Error::other)?;
        self.delivered = self.delivered.cadd(advance).map_err(io::Error::other)?;
        Ok(written)
    }

    fn next_block(&mut self) -> io::Result<()> {
        let needed = self.state.next_block_len();
        while self.filled < needed {
            let target = self.block.get_mut(self.filled..needed).unwrap_or_default();
            match self.source.read(target) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "source ended before the declared length of {} bytes",
                            self.state.length()
                        ),
                    ));
                }
                Ok(len) => self.filled = self.filled.cadd(len).map_err(io::Error::other)?,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        let block = self.block.get_mut(..needed).unwrap_or_default();
        self.state.apply(block)?;
        self.filled = 0;
        self.out_start = 0;
        self.out_end = needed;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let mac = self
            .state
            .mac()
            .ok_or_else(|| io::Error::other("stream is not finished"))?;
        self.mac = Some(mac);
        debug!(
            length = self.state.length(),
            chunks = self.state.chunk_count(),
            "cipher stream finished"
        );
        Ok(())
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        let current = self.delivered;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => current.checked_add_signed(delta),
            SeekFrom::End(delta) => self.state.length().checked_add_signed(delta),
        };
        if target == Some(current) {
            Ok(current)
        } else {
            Err(Error::Unsupported.into())
        }
    }
}

/// Encrypts a plaintext source of known length while it is being read.
///
/// The content authentication code is available from [`EncryptingReader::mac`]
/// once the reader has returned EOF.
pub struct EncryptingReader<R> {
    stream: Stream<R>,
}

impl<R: Read> EncryptingReader<R> {
    #[inline]
    pub fn new(source: R, length: u64, material: &FileKeyMaterial) -> Self {
        Self {
            stream: Stream::new(source, length, material, Direction::Encrypt),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.stream.cancel = Some(token);
        self
    }

    #[must_use]
    #[inline]
    pub fn mac(&self) -> Option<[u8; MAC_LENGTH]> {
        self.stream.mac
    }

    /// Key material with the computed MAC, ready to be sealed into a file node.
    #[must_use]
    #[inline]
    pub fn finished_key(&self) -> Option<FileKeyMaterial> {
        self.stream.mac.map(|mac| self.stream.material.with_mac(mac))
    }

    #[must_use]
    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.delivered
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl<R: Read> Seek for EncryptingReader<R> {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos)
    }
}

/// Decrypts a ciphertext source and verifies its MAC at the end of the stream.
///
/// The read that consumes the last block fails with [`Error::Integrity`] if the
/// computed MAC differs from the one in the key material. Everything returned
/// before that must be considered untrusted until the stream reaches EOF.
pub struct DecryptingReader<R> {
    stream: Stream<R>,
}

impl<R: Read> DecryptingReader<R> {
    #[inline]
    pub fn new(source: R, length: u64, material: &FileKeyMaterial) -> Self {
        Self {
            stream: Stream::new(source, length, material, Direction::Decrypt),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.stream.cancel = Some(token);
        self
    }

    /// Whether the whole stream was read and its MAC matched.
    #[must_use]
    #[inline]
    pub fn is_verified(&self) -> bool {
        self.stream.mac.is_some() && self.stream.failure.is_none()
    }

    #[must_use]
    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.delivered
    }

    fn verify(&mut self) -> io::Result<()> {
        // Empty streams carry no verifiable code.
        if let Some(mac) = self.stream.mac
            && self.stream.failure.is_none()
            && self.stream.state.length() != 0
            && mac != self.stream.material.mac
        {
            warn!(length = self.stream.state.length(), "content MAC mismatch");
            self.stream.failure = Some(Error::Integrity);
            return Err(Error::Integrity.into());
        }
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.stream.read(buf)?;
        self.verify()?;
        Ok(len)
    }
}

impl<R: Read> Seek for DecryptingReader<R> {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.stream.seek(pos)
    }
}

/// Encrypted body of a local file and the key material it was encrypted with.
#[derive(Debug)]
pub struct EncryptedFile {
    pub body: SpooledTempFile,
    pub size: u64,
    /// Includes the computed MAC.
    pub key: FileKeyMaterial,
}

/// Encrypts a local file with freshly generated key material.
///
/// The result is kept in memory up to `max_in_memory` bytes and spills to
/// a temporary file beyond that.
#[inline]
pub fn encrypt_file(
    path: &Path,
    max_in_memory: usize,
    cancel: Option<&CancellationToken>,
) -> io::Result<EncryptedFile> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut reader = EncryptingReader::new(BufReader::new(file), size, &FileKeyMaterial::generate());
    if let Some(token) = cancel {
        reader = reader.with_cancellation(token.clone());
    }
    let mut body = SpooledTempFile::new(max_in_memory);
    io::copy(&mut reader, &mut body)?;
    body.flush()?;
    body.rewind()?;
    let key = reader
        .finished_key()
        .ok_or_else(|| io::Error::other("encryption stopped before the end of the file"))?;
    Ok(EncryptedFile { body, size, key })
}

/// Decrypts `length` bytes of `source` into `output` and verifies the MAC.
///
/// On [`Error::Integrity`] the bytes already written to `output` are untrusted.
#[inline]
pub fn decrypt_to<R: Read, W: Write>(
    source: R,
    length: u64,
    material: &FileKeyMaterial,
    output: &mut W,
    cancel: Option<&CancellationToken>,
) -> io::Result<u64> {
    let mut reader = DecryptingReader::new(source, length, material);
    if let Some(token) = cancel {
        reader = reader.with_cancellation(token.clone());
    }
    let written = io::copy(&mut reader, output)?;
    if !reader.is_verified() {
        return Err(io::Error::other("decryption stopped before the end of the stream"));
    }
    output.flush()?;
    Ok(written)
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
        nodecrypt_protocol::AesKey,
        rand::{SeedableRng, rngs::StdRng},
        std::io::Cursor,
    };

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i.wrapping_mul(31) % 253) as u8).collect()
    }

    fn material(seed: u64) -> FileKeyMaterial {
        FileKeyMaterial::generate_with_rng(&mut StdRng::seed_from_u64(seed))
    }

    /// Reads the whole stream using reads of `step` bytes.
    fn read_in_steps(reader: &mut impl Read, step: usize) -> io::Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut buf = vec![0; step];
        loop {
            let len = reader.read(&mut buf)?;
            if len == 0 {
                return Ok(output);
            }
            output.extend_from_slice(&buf[..len]);
        }
    }

    fn encrypt(data: &[u8], material: &FileKeyMaterial) -> (Vec<u8>, FileKeyMaterial) {
        let mut reader = EncryptingReader::new(data, data.len() as u64, material);
        let ciphertext = read_in_steps(&mut reader, 4096).unwrap();
        (ciphertext, reader.finished_key().unwrap())
    }

    #[test]
    fn roundtrip_across_chunk_boundaries() {
        const KIB: usize = 1024;
        let lengths = [
            0,
            1,
            15,
            16,
            17,
            128 * KIB - 1,
            128 * KIB,
            128 * KIB + 1,
            384 * KIB + 7,
            3 * 1024 * KIB,
        ];
        for (seed, len) in lengths.into_iter().enumerate() {
            let data = sample(len);
            let (ciphertext, key) = encrypt(&data, &material(seed as u64));
            assert_eq!(ciphertext.len(), len);

            let mut reader = DecryptingReader::new(&ciphertext[..], len as u64, &key);
            let plaintext = read_in_steps(&mut reader, 65536).unwrap();
            assert_eq!(plaintext, data, "length {len}");
            assert!(reader.is_verified());
        }
    }

    #[test]
    fn odd_read_sizes() {
        let data = sample(1000);
        let key = material(1);
        let (reference, _) = encrypt(&data, &key);
        for step in [1, 3, 16, 17, 999] {
            let mut reader = EncryptingReader::new(&data[..], 1000, &key);
            assert_eq!(read_in_steps(&mut reader, step).unwrap(), reference);
        }
    }

    #[test]
    fn empty_stream_has_zero_mac() {
        let zero = FileKeyMaterial {
            nonce: [0; 8],
            mac: [0; 8],
            content_key: AesKey::from_bytes([0; 16]),
        };
        let mut reader = EncryptingReader::new(io::empty(), 0, &zero);
        assert_eq!(reader.mac(), None);
        assert_eq!(reader.read(&mut [0; 16]).unwrap(), 0);
        assert_eq!(reader.mac(), Some([0; 8]));

        let mut reader = DecryptingReader::new(io::empty(), 0, &zero);
        assert_eq!(reader.read(&mut [0; 16]).unwrap(), 0);
        assert!(reader.is_verified());

        let mut output = Vec::new();
        let written = decrypt_to(io::empty(), 0, &zero.with_mac([0x5a; 8]), &mut output, None);
        assert_eq!(written.unwrap(), 0);
    }

    #[test]
    fn known_answers() {
        let material = FileKeyMaterial {
            nonce: [7; 8],
            mac: [0; 8],
            content_key: AesKey::from_bytes(std::array::from_fn(|i| i as u8)),
        };

        let (ciphertext, key) = encrypt(&sample(33), &material);
        assert_eq!(
            hex::encode(&ciphertext[..16]),
            "e67fb6f7d64ae53bcd2f826435d7a735"
        );
        assert_eq!(crc32fast::hash(&ciphertext), 0x93c0_35f8);
        assert_eq!(hex::encode(key.mac), "1efa6b835a475671");

        // Eight progressive chunks, then two 1 MiB chunks and a 5-byte tail.
        let len = 4_718_592 + 2 * 1024 * 1024 + 5;
        let data = sample(len);
        let (ciphertext, key) = encrypt(&data, &material);
        assert_eq!(crc32fast::hash(&ciphertext), 0x6d00_1ccc);
        assert_eq!(hex::encode(key.mac), "d78b35f5aa0f2e19");

        let mut reader = DecryptingReader::new(&ciphertext[..], len as u64, &key);
        let plaintext = read_in_steps(&mut reader, 100_000).unwrap();
        assert!(reader.is_verified());
        assert!(plaintext == data);
    }

    #[test]
    fn known_ciphertext() {
        let key = FileKeyMaterial {
            nonce: [0; 8],
            mac: [0; 8],
            content_key: AesKey::from_bytes([0; 16]),
        };
        let (ciphertext, _) = encrypt(&[0; 16], &key);
        assert_eq!(hex::encode(ciphertext), "66e94bd4ef8a2c3b884cfa59ca342b2e");
    }

    #[test]
    fn tamper_detected_at_end_only() {
        let len = 200 * 1024;
        let data = sample(len);
        let (mut ciphertext, key) = encrypt(&data, &material(7));
        ciphertext[1234] ^= 0x10;

        let mut reader = DecryptingReader::new(&ciphertext[..], len as u64, &key);
        let mut buf = vec![0; len - 16];
        reader.read_exact(&mut buf).unwrap();
        assert_ne!(buf[1234], data[1234]);

        let err = reader.read(&mut [0; 64]).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Integrity));
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        // Stays failed.
        let err = reader.read(&mut [0; 64]).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Integrity));
        assert!(!reader.is_verified());
    }

    #[test]
    fn every_bit_flip_is_detected() {
        let data = sample(48);
        let (ciphertext, key) = encrypt(&data, &material(3));
        for index in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[index] ^= 1 << bit;
                let mut output = Vec::new();
                let err = decrypt_to(&tampered[..], 48, &key, &mut output, None).unwrap_err();
                assert_eq!(Error::from_io(&err), Some(&Error::Integrity));
            }
        }
    }

    #[test]
    fn wrong_expected_mac() {
        let data = sample(100);
        let (ciphertext, key) = encrypt(&data, &material(5));
        let wrong = key.with_mac([0xAA; 8]);
        let err = decrypt_to(&ciphertext[..], 100, &wrong, &mut io::sink(), None).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Integrity));
    }

    #[test]
    fn cancellation_poisons_stream() {
        let data = sample(4096);
        let token = CancellationToken::new();
        let mut reader =
            EncryptingReader::new(&data[..], 4096, &material(2)).with_cancellation(token.clone());
        let mut buf = [0; 100];
        reader.read_exact(&mut buf).unwrap();

        token.cancel();
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Cancelled));
        let err = io::copy(&mut reader, &mut io::sink()).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Cancelled));
        assert_eq!(reader.mac(), None);
    }

    #[test]
    fn seek_is_noop_only() {
        let data = sample(64);
        let mut reader = EncryptingReader::new(&data[..], 64, &material(4));
        assert_eq!(reader.stream_position().unwrap(), 0);
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        reader.read_exact(&mut [0; 20]).unwrap();
        assert_eq!(reader.seek(SeekFrom::Current(0)).unwrap(), 20);
        assert_eq!(reader.seek(SeekFrom::End(-44)).unwrap(), 20);

        let err = reader.seek(SeekFrom::Start(0)).unwrap_err();
        assert_eq!(Error::from_io(&err), Some(&Error::Unsupported));
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        reader.seek(SeekFrom::Current(1)).unwrap_err();
    }

    #[test]
    fn truncated_source() {
        let data = sample(10);
        let mut reader = EncryptingReader::new(&data[..], 20, &material(6));
        let err = read_in_steps(&mut reader, 32).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn short_source_reads() {
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let len = buf.len().min(self.0.len()).min(3);
                buf[..len].copy_from_slice(&self.0[..len]);
                self.0 = &self.0[len..];
                Ok(len)
            }
        }

        let data = sample(77);
        let key = material(8);
        let (reference, _) = encrypt(&data, &key);
        let mut reader = EncryptingReader::new(Trickle(&data), 77, &key);
        assert_eq!(read_in_steps(&mut reader, 50).unwrap(), reference);
    }

    #[test]
    fn encrypt_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        let data = sample(70_000);
        fs_err::write(&path, &data).unwrap();

        // Small in-memory limit forces a spill to disk.
        let mut encrypted = encrypt_file(&path, 1024, None).unwrap();
        assert_eq!(encrypted.size, 70_000);
        let mut plaintext = Vec::new();
        decrypt_to(
            &mut encrypted.body,
            encrypted.size,
            &encrypted.key,
            &mut plaintext,
            None,
        )
        .unwrap();
        assert_eq!(plaintext, data);

        let mut ciphertext = Vec::new();
        encrypted.body.rewind().unwrap();
        encrypted.body.read_to_end(&mut ciphertext).unwrap();
        let mut again = Cursor::new(ciphertext);
        let mut output = Vec::new();
        decrypt_to(&mut again, 70_000, &encrypted.key, &mut output, None).unwrap();
        assert_eq!(output, data);
    }
}
