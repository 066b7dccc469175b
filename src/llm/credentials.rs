//! API key storage: environment, then OS keyring, then a private file

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVICE_NAME: &str = "ace-playbook";
const API_KEY_USERNAME: &str = "openrouter-api-key";
const API_KEY_FILE: &str = "api_key.txt";

/// Environment variable checked before any stored key
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

fn api_key_file_path() -> Result<PathBuf> {
    let dir = crate::config::config_dir()?;
    fs::create_dir_all(&dir).context("Failed to create config directory")?;
    Ok(dir.join(API_KEY_FILE))
}

/// Store the key in the keyring, keeping a file copy as backup
pub fn set_api_key(key: &str) -> Result<()> {
    let path = api_key_file_path()?;
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if entry.set_password(key).is_ok() {
            let _ = write_key_file(&path, key);
            return Ok(());
        }
    }

    write_key_file(&path, key)?;
    println!("Note: Using file-based storage (keyring unavailable)");
    Ok(())
}

/// Resolve the key: `OPENROUTER_API_KEY`, keyring, then the fallback file
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            debug!("Using API key from {}", API_KEY_ENV);
            return Ok(key.trim().to_string());
        }
    }

    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if let Ok(key) = entry.get_password() {
            return Ok(key);
        }
    }

    read_key_file(&api_key_file_path()?)
        .context("No API key found. Set OPENROUTER_API_KEY or run 'ace-playbook config --set-api-key YOUR_KEY'.")
}

pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

pub fn delete_api_key() -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        let _ = entry.delete_credential();
    }
    let path = api_key_file_path()?;
    if path.exists() {
        fs::remove_file(&path).context("Failed to delete API key file")?;
    }
    Ok(())
}

fn write_key_file(path: &Path, key: &str) -> Result<()> {
    fs::write(path, key).context("Failed to write API key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    Ok(())
}

fn read_key_file(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path).context("Failed to read API key file")?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key file {} is empty", path.display());
    }
    Ok(key.to_string())
}
