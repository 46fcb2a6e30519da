use {
    crate::encoding,
    anyhow::{Error, Result, ensure, format_err},
    std::str::FromStr,
};

/// A node key as sent by the server: `handle:wrappedKey`, optionally followed
/// by `/`-separated alternates.
///
/// Alternates show up when a node is reachable through more than one share.
/// Only the first entry is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeKeyBlob {
    /// Empty for keys wrapped directly under the master key.
    pub handle: Option<String>,
    pub wrapped: Vec<u8>,
    pub alternates: usize,
}

impl NodeKeyBlob {
    #[must_use]
    #[inline]
    pub fn is_file_sized(&self) -> bool {
        self.wrapped.len() == 32
    }
}

impl FromStr for NodeKeyBlob {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let mut segments = s.split('/');
        let first = segments.next().unwrap_or_default();
        let alternates = segments.count();
        let (handle, key) = first
            .split_once(':')
            .ok_or_else(|| format_err!("missing handle separator in node key"))?;
        ensure!(!key.is_empty(), "empty wrapped key in node key");
        let wrapped = encoding::decode(key)?;
        ensure!(
            matches!(wrapped.len(), 16 | 32),
            "invalid wrapped key length: {}",
            wrapped.len()
        );
        Ok(Self {
            handle: if handle.is_empty() {
                None
            } else {
                Some(handle.to_owned())
            },
            wrapped,
            alternates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY16: &str = "AAECAwQFBgcICQoLDA0ODw";

    #[test]
    fn owned_key() {
        let blob: NodeKeyBlob = format!("userHandle1:{KEY16}").parse().unwrap();
        assert_eq!(blob.handle.as_deref(), Some("userHandle1"));
        assert_eq!(blob.wrapped.len(), 16);
        assert_eq!(blob.alternates, 0);
        assert!(!blob.is_file_sized());
    }

    #[test]
    fn empty_handle() {
        let blob: NodeKeyBlob = format!(":{}", encoding::encode(&[1; 32])).parse().unwrap();
        assert_eq!(blob.handle, None);
        assert_eq!(blob.wrapped, [1; 32]);
    }

    #[test]
    fn first_alternate_wins() {
        let other = encoding::encode(&[9; 16]);
        let blob: NodeKeyBlob = format!("shareAAA:{KEY16}/shareBBB:{other}")
            .parse()
            .unwrap();
        assert_eq!(blob.handle.as_deref(), Some("shareAAA"));
        assert_eq!(blob.wrapped[1], 1);
        assert_eq!(blob.alternates, 1);
    }

    #[test]
    fn file_sized_key() {
        let blob: NodeKeyBlob = format!("h:{}", encoding::encode(&[3; 32])).parse().unwrap();
        assert!(blob.is_file_sized());
    }

    #[test]
    fn unrecognized_shapes() {
        KEY16.parse::<NodeKeyBlob>().unwrap_err();
        "handle:".parse::<NodeKeyBlob>().unwrap_err();
        "handle:@@@".parse::<NodeKeyBlob>().unwrap_err();
        format!("handle:{}", encoding::encode(&[0; 20]))
            .parse::<NodeKeyBlob>()
            .unwrap_err();
        "".parse::<NodeKeyBlob>().unwrap_err();
    }
}
