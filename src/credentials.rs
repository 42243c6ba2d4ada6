//! Refresh-token storage for the Gmail authorization
//!
//! Tokens go to the OS keyring when it works, otherwise to a per-account file
//! readable only by the owner.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const KEYRING_SERVICE: &str = "hovermail";

pub struct TokenStore {
    account: String,
    token_file: PathBuf,
    use_keyring: bool,
}

impl TokenStore {
    pub fn new(account: &str) -> Self {
        let dir = crate::config::Config::config_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(account, &dir, true)
    }

    fn in_dir(account: &str, dir: &Path, use_keyring: bool) -> Self {
        let safe = account.replace(['@', '.', '/', '\\', ':'], "_");
        Self {
            account: account.to_string(),
            token_file: dir.join(format!(".refresh_{}", safe)),
            use_keyring,
        }
    }

    fn keyring_key(&self) -> String {
        format!("gmail-refresh:{}", self.account)
    }

    fn keyring_entry(&self) -> Option<keyring::Entry> {
        if !self.use_keyring {
            return None;
        }
        keyring::Entry::new(KEYRING_SERVICE, &self.keyring_key()).ok()
    }

    /// Stored refresh token, keyring first
    pub fn load(&self) -> Option<String> {
        if let Some(token) = self.keyring_entry().and_then(|e| e.get_password().ok()) {
            return Some(token);
        }
        fs::read_to_string(&self.token_file)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn save(&self, refresh_token: &str) -> Result<()> {
        if let Some(entry) = self.keyring_entry()
            && entry.set_password(refresh_token).is_ok()
            && entry.get_password().is_ok()
        {
            tracing::debug!("Stored refresh token for {} in keyring", self.account);
            return Ok(());
        }

        tracing::info!(
            "Keyring unavailable, storing refresh token in {}",
            self.token_file.display()
        );
        self.write_file(refresh_token)
    }

    fn write_file(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.token_file.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        #[cfg(unix)]
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.token_file)
                .context("Failed to open token file")?;
            file.write_all(token.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.token_file, token).context("Failed to write token file")?;
        }

        Ok(())
    }

    /// Forget the stored token, e.g. after the provider revoked it
    pub fn clear(&self) {
        if let Some(entry) = self.keyring_entry() {
            let _ = entry.delete_credential();
        }
        let _ = fs::remove_file(&self.token_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> TokenStore {
        let dir = std::env::temp_dir().join(format!("hovermail_test_{}_{}", tag, std::process::id()));
        TokenStore::in_dir("user.name@example.com", &dir, false)
    }

    #[test]
    fn test_file_name_sanitized() {
        let store = temp_store("name");
        let name = store.token_file.file_name().unwrap().to_string_lossy();
        assert_eq!(name, ".refresh_user_name_example_com");
    }

    #[test]
    fn test_file_round_trip_and_clear() {
        let store = temp_store("roundtrip");
        store.clear();
        assert_eq!(store.load(), None);

        store.save("1//refresh-token\n").unwrap();
        assert_eq!(store.load().as_deref(), Some("1//refresh-token"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&store.token_file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear();
        assert_eq!(store.load(), None);
    }
}
