//! All encryption operations use AES-128.
//!
//! Keys form a hierarchy rooted in the account's master key. Folder keys and
//! file keys are wrapped (AES-ECB, block by block) under the master key or under
//! the shared key of the subtree they belong to. Shared keys are in turn wrapped
//! under the master key.
//!
//! A file key is 32 bytes long and consists of
//!
//! - nonce (64 bits), used as the upper half of every counter block,
//! - content MAC (64 bits), the expected authentication code of the file body,
//! - content key (128 bits).
//!
//! Node attributes (name and fingerprint) are stored as JSON prefixed with `MEGA`,
//! zero-padded and encrypted with AES-CBC using a zero IV.
//!
//! File content is encrypted in counter mode. The counter block is the nonce followed by
//! a big-endian block index. Content is split into chunks (see [`chunk_boundaries`]).
//! Each chunk gets a CBC-MAC of its plaintext, seeded with the nonce twice, and chunk MACs
//! are chained into a file MAC. The file MAC is condensed to 64 bits and stored in the file key.
//! Integrity of the file content is ensured on decryption by comparing the condensed MAC.

mod chunks;
mod cipher;
mod ctr_mac;
mod file_key;
mod io;

pub use {
    chunks::{CHUNK_STEP, MAX_CHUNK_SIZE, chunk_boundaries},
    cipher::{BLOCK_SIZE, Cipher},
    ctr_mac::{CtrMac, Direction},
    file_key::{FULL_KEY_LENGTH, FileKeyMaterial, MAC_LENGTH, NONCE_LENGTH},
    io::{
        DEFAULT_MAX_IN_MEMORY, DecryptingReader, EncryptedFile, EncryptingReader, decrypt_to,
        encrypt_file,
    },
};
