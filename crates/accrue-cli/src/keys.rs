//! Owner key files.
//!
//! A key file holds the hex-encoded 32-byte Ed25519 secret and nothing else.
//! The account id is the public key, so it is never stored.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use accrue_crypto::ed25519::SigningKey;
use anyhow::{anyhow, Context as _};
use zeroize::Zeroizing;

/// Write `key` to a new file at `path`. An existing file is never replaced.
pub fn write_key_file(path: &Path, key: &SigningKey) -> anyhow::Result<()> {
    let encoded = Zeroizing::new(hex::encode(key.to_bytes()));
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating key file {}", path.display()))?;
    file.write_all(encoded.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

pub fn read_key_file(path: &Path) -> anyhow::Result<SigningKey> {
    let text = Zeroizing::new(
        std::fs::read_to_string(path).with_context(|| format!("reading key file {}", path.display()))?,
    );
    let bytes = Zeroizing::new(
        hex::decode(text.trim()).map_err(|e| anyhow!("key file {}: {e}", path.display()))?,
    );
    let secret: &[u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("key file {}: expected 32 bytes, got {}", path.display(), bytes.len()))?;
    Ok(SigningKey::from_bytes(secret))
}
