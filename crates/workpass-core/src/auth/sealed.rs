//! Encrypted variant of the session file.
//!
//! The record is serialized to JSON and sealed with ChaCha20-Poly1305. The
//! key is derived with Argon2id from a passphrase and a random salt that is
//! regenerated on every write, so the file on disk never holds a token in
//! the clear.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{remove_if_exists, write_atomic, SessionStore, SESSION_FILE};
use super::SessionRecord;

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Serialize, Deserialize)]
struct SealedEnvelope {
    version: u8,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

pub struct SealedFileStore {
    path: PathBuf,
    passphrase: String,
}

impl SealedFileStore {
    pub fn new(cache_dir: PathBuf, passphrase: String) -> Result<Self> {
        if passphrase.is_empty() {
            bail!("Session passphrase must not be empty");
        }
        Ok(Self {
            path: cache_dir.join(SESSION_FILE),
            passphrase,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
        Ok(key)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope> {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to seal session"))?;

        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            salt: salt.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION {
            bail!("Unsupported session envelope version {}", envelope.version);
        }
        if envelope.salt.len() != SALT_LEN || envelope.nonce.len() != NONCE_LEN {
            bail!("Malformed session envelope");
        }
        let key = self.derive_key(&envelope.salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
            .map_err(|_| anyhow!("Failed to unseal session file - wrong passphrase or tampered file"))
    }
}

impl SessionStore for SealedFileStore {
    fn load(&self) -> Result<Option<SessionRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        let envelope: SealedEnvelope =
            serde_json::from_str(&contents).context("Failed to parse session envelope")?;
        let plaintext = self.open(&envelope)?;
        let record = serde_json::from_slice(&plaintext).context("Failed to parse sealed session")?;
        Ok(Some(record))
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let plaintext = serde_json::to_vec(record)?;
        let envelope = self.seal(&plaintext)?;
        write_atomic(&self.path, &serde_json::to_vec(&envelope)?)?;
        debug!(path = %self.path.display(), "Sealed session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}
