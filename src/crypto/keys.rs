use crate::common::error::{FaceGateError, Result};
use rand::RngCore;
use std::fs;
use std::path::Path;

/// AES-128 key size.
pub const KEY_LEN: usize = 16;

/// Load the process key from `path`, generating and persisting a new one if
/// the file does not exist yet. The key stays fixed for the process lifetime;
/// there is no rotation.
pub fn load_or_generate_key(path: &Path) -> Result<[u8; KEY_LEN]> {
    if path.exists() {
        let bytes = fs::read(path)?;
        if bytes.len() != KEY_LEN {
            return Err(FaceGateError::Key(format!(
                "Key file {} has {} bytes, expected {}",
                path.display(),
                bytes.len(),
                KEY_LEN
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        return Ok(key);
    }

    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("Generated new encryption key at {}", path.display());
    Ok(key)
}
