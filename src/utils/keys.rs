//! Per-installation key material.
//!
//! Key file layout (identical bytes in `<name>.bank` and `<name>.atm`):
//! ```text
//! +----------------+----------------+
//! | PIN KEY (32B)  | MSG KEY (32B)  |
//! +----------------+----------------+
//! ```

use std::{
    ffi::OsString,
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_SIZE};
use crate::error::{Error, Result};

/// Total size of a key file.
pub const KEY_FILE_SIZE: usize = 2 * KEY_SIZE;

/// Extension of the Bank's copy of the keys.
pub const BANK_EXTENSION: &str = ".bank";

/// Extension of the ATM's copy of the keys.
pub const ATM_EXTENSION: &str = ".atm";

/// The two symmetric keys shared by an ATM and its Bank.
pub struct KeyMaterial {
    pin_key: Zeroizing<[u8; KEY_SIZE]>,
    msg_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl KeyMaterial {
    /// Build from raw key file contents. Bytes past the two keys are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < KEY_FILE_SIZE {
            return Err(Error::KeyFile(format!(
                "expected {} bytes, found {}",
                KEY_FILE_SIZE,
                bytes.len()
            )));
        }

        let mut pin_key = Zeroizing::new([0u8; KEY_SIZE]);
        let mut msg_key = Zeroizing::new([0u8; KEY_SIZE]);
        pin_key.copy_from_slice(&bytes[..KEY_SIZE]);
        msg_key.copy_from_slice(&bytes[KEY_SIZE..KEY_FILE_SIZE]);

        Ok(Self { pin_key, msg_key })
    }

    /// Fresh random keys.
    pub fn generate() -> Result<Self> {
        let bytes = Zeroizing::new(crypto::random_bytes(KEY_FILE_SIZE)?);
        Self::from_bytes(&bytes)
    }

    /// Read keys from an installation file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = Zeroizing::new(fs::read(path)?);
        Self::from_bytes(&bytes)
    }

    /// Key protecting PINs on cards.
    pub fn pin_key(&self) -> &[u8; KEY_SIZE] {
        &self.pin_key
    }

    /// Key protecting ATM <-> Bank traffic.
    pub fn msg_key(&self) -> &[u8; KEY_SIZE] {
        &self.msg_key
    }

    fn to_file_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(KEY_FILE_SIZE));
        bytes.extend_from_slice(&self.pin_key[..]);
        bytes.extend_from_slice(&self.msg_key[..]);
        bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("pin_key", &"<redacted>")
            .field("msg_key", &"<redacted>")
            .finish()
    }
}

/// Paths written by [`provision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub bank_file: PathBuf,
    pub atm_file: PathBuf,
}

fn with_extension_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(ext);
    PathBuf::from(name)
}

impl Installation {
    /// `<base>.bank` and `<base>.atm`.
    pub fn for_base(base: &Path) -> Self {
        Self {
            bank_file: with_extension_suffix(base, BANK_EXTENSION),
            atm_file: with_extension_suffix(base, ATM_EXTENSION),
        }
    }
}

fn write_exclusive(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Generate keys and write them to `<base>.bank` and `<base>.atm`.
///
/// Missing parent directories are created. Existing files are never
/// overwritten: the error kind is then [`io::ErrorKind::AlreadyExists`].
pub fn provision(base: &Path) -> Result<Installation> {
    let install = Installation::for_base(base);

    if install.bank_file.exists() || install.atm_file.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "one of the files already exists",
        )));
    }

    if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let keys = KeyMaterial::generate()?;
    let bytes = keys.to_file_bytes();
    write_exclusive(&install.bank_file, &bytes)?;
    write_exclusive(&install.atm_file, &bytes)?;

    info!(bank = %install.bank_file.display(), atm = %install.atm_file.display(), "provisioned installation");
    Ok(install)
}
