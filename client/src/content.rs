use {
    anyhow::{Context, Result, bail},
    chrono::{DateTime, Utc},
    fs_err::File,
    nodecrypt_protocol::{Fingerprint, encoding},
    nodecrypt_sdk::{
        CancellationToken, Error, compute_fingerprint,
        crypto::{FileKeyMaterial, decrypt_to, encrypt_file},
    },
    std::{
        io::{self, BufReader, BufWriter},
        path::Path,
    },
    tempfile::NamedTempFile,
    tracing::info,
};

/// Temporary file next to `path`, moved into place by [`commit_output`].
fn create_output(path: &Path) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(NamedTempFile::new_in(dir)?)
}

fn commit_output(file: NamedTempFile, path: &Path) -> Result<()> {
    file.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn encrypt(
    input: &Path,
    output: &Path,
    spool_in_memory: usize,
    cancel: &CancellationToken,
) -> Result<FileKeyMaterial> {
    let mut encrypted = encrypt_file(input, spool_in_memory, Some(cancel))?;
    let mut file = create_output(output)?;
    io::copy(&mut encrypted.body, &mut file)?;
    commit_output(file, output)?;
    info!(
        size = encrypted.size,
        "encrypted {} into {}",
        input.display(),
        output.display()
    );
    info!("key: {}", encoding::encode(&encrypted.key.compose()));
    info!("mac: {}", hex::encode(encrypted.key.mac));
    Ok(encrypted.key)
}

/// Decrypts `input` into `output`. Nothing is written unless the MAC matches.
pub fn decrypt(
    input: &Path,
    output: &Path,
    key: &str,
    cancel: &CancellationToken,
) -> Result<u64> {
    let material = FileKeyMaterial::split(&encoding::decode(key)?)?;
    let source = File::open(input)?;
    let length = source.metadata()?.len();
    let mut file = create_output(output)?;
    let written = match decrypt_to(
        BufReader::new(source),
        length,
        &material,
        &mut BufWriter::new(&mut file),
        Some(cancel),
    ) {
        Ok(written) => written,
        Err(err) => {
            if Error::from_io(&err) == Some(&Error::Integrity) {
                bail!("{} is corrupted or the key is wrong: {err}", input.display());
            }
            return Err(err.into());
        }
    };
    commit_output(file, output)?;
    info!(written, "decrypted {} into {}", input.display(), output.display());
    Ok(written)
}

pub fn fingerprint(path: &Path) -> Result<Option<Fingerprint>> {
    let mut file = File::open(path)?;
    let modified = file.metadata()?.modified().ok().map(DateTime::<Utc>::from);
    let fingerprint = compute_fingerprint(&mut file, modified)?;
    match &fingerprint {
        Some(fingerprint) => info!("{}: {}", path.display(), fingerprint.to_base64()),
        None => info!("{}: no modification time, no fingerprint", path.display()),
    }
    Ok(fingerprint)
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[test]
    fn encrypt_then_decrypt() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        let data: Vec<u8> = (0..300_000_u32)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        fs_err::write(&plain, &data).unwrap();

        let token = CancellationToken::new();
        let encrypted = dir.path().join("encrypted");
        let key = encrypt(&plain, &encrypted, 1024, &token).unwrap();
        assert_ne!(fs_err::read(&encrypted).unwrap(), data);

        let decrypted = dir.path().join("decrypted");
        let key = encoding::encode(&key.compose());
        assert_eq!(decrypt(&encrypted, &decrypted, &key, &token).unwrap(), 300_000);
        assert_eq!(fs_err::read(&decrypted).unwrap(), data);
    }

    #[test]
    fn tampered_file_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        fs_err::write(&plain, b"attack at dawn").unwrap();
        let token = CancellationToken::new();
        let encrypted = dir.path().join("encrypted");
        let key = encrypt(&plain, &encrypted, 1024, &token).unwrap();

        let mut body = fs_err::read(&encrypted).unwrap();
        *body.first_mut().unwrap() ^= 1;
        fs_err::write(&encrypted, &body).unwrap();

        let decrypted = dir.path().join("decrypted");
        let key = encoding::encode(&key.compose());
        decrypt(&encrypted, &decrypted, &key, &token).unwrap_err();
        assert!(!decrypted.exists());
    }

    #[test]
    fn cancelled_encryption_fails() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain");
        fs_err::write(&plain, [0_u8; 4096]).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        encrypt(&plain, &dir.path().join("encrypted"), 1024, &token).unwrap_err();
    }

    #[test]
    fn fingerprint_of_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small");
        fs_err::write(&path, b"0123456789abcdef").unwrap();
        let fingerprint = fingerprint(&path).unwrap().unwrap();
        assert_eq!(
            fingerprint.crc,
            [0x3332_3130, 0x3736_3534, 0x6261_3938, 0x6665_6463]
        );
        assert!(fingerprint.modified_epoch.is_some());
    }
}
