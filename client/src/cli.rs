use {
    clap::{Parser, Subcommand},
    nodecrypt_protocol::link::PublicLink,
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Cli {
    /// Config file. Defaults to `nodecrypt.json5` in the user config dir.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encrypt a local file with fresh key material and print the key.
    Encrypt { input: PathBuf, output: PathBuf },
    /// Decrypt a file and verify its MAC.
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        /// Full 32-byte file key, base64url.
        #[arg(short, long)]
        key: String,
    },
    /// Print the content fingerprint of a local file.
    Fingerprint { path: PathBuf },
    /// Decrypt a saved node listing and print the paths it contains.
    Tree {
        nodes: PathBuf,
        /// Resolve the listing as a public folder behind this link.
        #[arg(long)]
        link: Option<PublicLink>,
        /// Also list nodes that could not be decrypted.
        #[arg(short, long)]
        all: bool,
    },
    /// Print the share request for a folder of a saved node listing.
    Share { nodes: PathBuf, node_id: String },
    /// Parse a public link.
    Link { link: PublicLink },
}
