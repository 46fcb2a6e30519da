//! Cryptographic engine of the encrypted node storage protocol.
//!
//! - [`crypto`]: AES primitives, the chunked CTR+MAC content cipher and its streaming readers.
//! - [`tree`]: decryption of node keys and attributes over a fetched node tree.
//! - [`share`]: key material for sharing a subtree.
//! - [`seal`]: encryption of new and renamed nodes.
//! - [`fingerprint`]: sampled content fingerprint.

pub mod cancel;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod seal;
pub mod share;
pub mod signal;
pub mod tree;

pub use crate::{
    cancel::{CancellableReader, CancellationToken},
    error::Error,
    fingerprint::compute_fingerprint,
    share::{Share, share_subtree},
    tree::{Access, Node, NodeKeys, NodeState, NodeTree, ResolveContext},
};
pub use nodecrypt_protocol as protocol;
