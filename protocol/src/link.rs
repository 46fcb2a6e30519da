use {
    crate::{NodeId, encoding},
    anyhow::{Context, Error, Result, bail, ensure},
    std::str::FromStr,
    url::Url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    File,
    Folder,
}

impl LinkKind {
    /// Files are linked with their full 32-byte key, folders with the folder key.
    #[must_use]
    #[inline]
    pub fn key_length(self) -> usize {
        match self {
            Self::File => 32,
            Self::Folder => 16,
        }
    }
}

/// A public link to a file or folder: the node id plus the key it is readable with.
///
/// Accepted forms:
///
/// - `https://host/file/<id>#<key>`, `https://host/folder/<id>#<key>`
/// - `https://host/#!<id>!<key>`, `https://host/#F!<id>!<key>`
#[derive(Clone, PartialEq, Eq)]
pub struct PublicLink {
    pub kind: LinkKind,
    pub id: NodeId,
    pub key: Vec<u8>,
}

impl FromStr for PublicLink {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).with_context(|| format!("invalid link `{s}`"))?;
        let fragment = url.fragment().context("link has no key fragment")?;
        let segments = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();

        let (kind, id, key) = match segments.as_slice() {
            [kind @ ("file" | "folder"), id] => {
                let kind = if *kind == "file" {
                    LinkKind::File
                } else {
                    LinkKind::Folder
                };
                // Folder links may point into a subfolder after the key.
                let key = fragment.split('/').next().unwrap_or_default();
                (kind, *id, key)
            }
            [] => {
                let (kind, rest) = if let Some(rest) = fragment.strip_prefix("F!") {
                    (LinkKind::Folder, rest)
                } else if let Some(rest) = fragment.strip_prefix('!') {
                    (LinkKind::File, rest)
                } else {
                    bail!("unrecognized legacy link fragment");
                };
                let (id, key) = rest.split_once('!').context("missing key in legacy link")?;
                (kind, id, key)
            }
            _ => bail!("unrecognized link path `{}`", url.path()),
        };
        ensure!(!id.is_empty(), "empty node id in link");
        let key = encoding::decode(key)?;
        ensure!(
            key.len() == kind.key_length(),
            "invalid key length in link: got {}, expected {}",
            key.len(),
            kind.key_length()
        );
        Ok(Self {
            kind,
            id: NodeId::from(id),
            key,
        })
    }
}

impl std::fmt::Debug for PublicLink {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicLink")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_style_links() {
        let key = encoding::encode(&[5; 32]);
        let link: PublicLink = format!("https://example.com/file/AbCdEfGh#{key}")
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::File);
        assert_eq!(link.id.as_str(), "AbCdEfGh");
        assert_eq!(link.key, vec![5; 32]);

        let key = encoding::encode(&[6; 16]);
        let link: PublicLink = format!("https://example.com/folder/FoLdEr12#{key}/folder/sub")
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::Folder);
        assert_eq!(link.key, vec![6; 16]);
    }

    #[test]
    fn legacy_links() {
        let key = encoding::encode(&[7; 16]);
        let link: PublicLink = format!("https://example.com/#F!FoLdEr12!{key}")
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::Folder);
        assert_eq!(link.id.as_str(), "FoLdEr12");

        let key = encoding::encode(&[8; 32]);
        let link: PublicLink = format!("https://example.com/#!AbCdEfGh!{key}")
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::File);
    }

    #[test]
    fn rejects_bad_links() {
        let short = encoding::encode(&[1; 16]);
        format!("https://example.com/file/AbCdEfGh#{short}")
            .parse::<PublicLink>()
            .unwrap_err();
        "https://example.com/file/AbCdEfGh"
            .parse::<PublicLink>()
            .unwrap_err();
        format!("https://example.com/other/AbCdEfGh#{short}")
            .parse::<PublicLink>()
            .unwrap_err();
        "not a url".parse::<PublicLink>().unwrap_err();
    }
}
