//! Embedded single-file cache adapter.
//!
//! The whole cache is kept in memory and written back to one file after
//! every mutation. The file holds a JSON document
//! `{ "<key>": { "value": ..., "expireAt": <ms since epoch> | null } }`,
//! optionally sealed with AES-256-GCM (`nonce || ciphertext`, 96-bit random
//! nonce, key derived as SHA-256 of the configured passphrase).
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash never leaves a half-written cache behind.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::pattern::glob_match;
use crate::traits::{CacheAdapter, CacheStats};

pub const EMBEDDED_ADAPTER: &str = "embedded";

/// Options accepted by the `embedded` registry factory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmbeddedOptions {
    pub path: PathBuf,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: Value,
    #[serde(rename = "expireAt")]
    expire_at: Option<i64>,
}

impl StoredEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expire_at.is_none_or(|exp| exp > now_ms)
    }
}

pub struct EmbeddedAdapter {
    path: PathBuf,
    cipher: Option<LessSafeKey>,
    entries: Mutex<BTreeMap<String, StoredEntry>>,
}

impl EmbeddedAdapter {
    /// Open (or create) the cache file at `path`.
    ///
    /// With `encryption_key` set the file is sealed; opening an existing
    /// file with the wrong key fails with [`CacheError::Encryption`].
    pub async fn open(
        path: impl Into<PathBuf>,
        encryption_key: Option<&str>,
    ) -> CacheResult<Self> {
        let path = path.into();
        let cipher = encryption_key.map(derive_cipher).transpose()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(raw) => decode(cipher.as_ref(), &raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let now = now_ms();
        let entries: BTreeMap<_, _> = entries
            .into_iter()
            .filter(|(_, entry)| entry.is_live(now))
            .collect();

        info!(
            path = %path.display(),
            entries = entries.len(),
            encrypted = cipher.is_some(),
            "embedded cache opened"
        );

        Ok(Self {
            path,
            cipher,
            entries: Mutex::new(entries),
        })
    }

    pub async fn from_options(options: EmbeddedOptions) -> CacheResult<Self> {
        Self::open(options.path, options.encryption_key.as_deref()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `next` to disk, dropping expired entries, and only then make it
    /// the current map. On failure `current` is left untouched.
    async fn commit(
        &self,
        current: &mut BTreeMap<String, StoredEntry>,
        mut next: BTreeMap<String, StoredEntry>,
    ) -> CacheResult<()> {
        let now = now_ms();
        next.retain(|_, entry| entry.is_live(now));
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<String, StoredEntry>) -> CacheResult<()> {
        let json =
            serde_json::to_vec(entries).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let bytes = match &self.cipher {
            Some(cipher) => seal(cipher, &json)?,
            None => json,
        };

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "embedded cache persisted");
        Ok(())
    }
}

#[async_trait]
impl CacheAdapter for EmbeddedAdapter {
    fn name(&self) -> &str {
        EMBEDDED_ADAPTER
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        let expire_at = ttl.map(|d| {
            now_ms().saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        });
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), StoredEntry { value, expire_at });
        self.commit(&mut entries, next).await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = now_ms();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.commit(&mut entries, next).await
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        self.commit(&mut entries, BTreeMap::new()).await
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = now_ms();
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let now = now_ms();
        let entries = self.entries.lock().await;
        let live = entries.values().filter(|e| e.is_live(now)).count();
        Ok(CacheStats::new(EMBEDDED_ADAPTER, live)
            .with("path", self.path.display().to_string())
            .with("encrypted", self.cipher.is_some()))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = now_ms();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expire_at)
            .map(|exp| Duration::from_millis((exp - now) as u64)))
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        let now = now_ms();
        let mut entries = self.entries.lock().await;
        let expired = entries.values().filter(|e| !e.is_live(now)).count();
        if expired > 0 {
            let next = entries.clone();
            self.commit(&mut entries, next).await?;
        }
        Ok(expired)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("cache"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn derive_cipher(passphrase: &str) -> CacheResult<LessSafeKey> {
    if passphrase.is_empty() {
        return Err(CacheError::Config("encryption key must not be empty".into()));
    }
    let key = digest(&SHA256, passphrase.as_bytes());
    let key = UnboundKey::new(&AES_256_GCM, key.as_ref())
        .map_err(|_| CacheError::Encryption("invalid AES-256 key".into()))?;
    Ok(LessSafeKey::new(key))
}

fn seal(cipher: &LessSafeKey, plaintext: &[u8]) -> CacheResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| CacheError::Encryption("no randomness for nonce".into()))?;

    let mut in_out = plaintext.to_vec();
    cipher
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
        .map_err(|_| CacheError::Encryption("failed to encrypt cache file".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn open_sealed(cipher: &LessSafeKey, data: &[u8]) -> CacheResult<Vec<u8>> {
    if data.len() < NONCE_LEN + AES_256_GCM.tag_len() {
        return Err(CacheError::Encryption("cache file is truncated".into()));
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| CacheError::Encryption("malformed nonce".into()))?;
    let mut in_out = ciphertext.to_vec();
    let plain = cipher
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| {
            CacheError::Encryption("cache file cannot be decrypted with the configured key".into())
        })?;
    Ok(plain.to_vec())
}

fn decode(
    cipher: Option<&LessSafeKey>,
    raw: &[u8],
) -> CacheResult<BTreeMap<String, StoredEntry>> {
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }
    let plain = match cipher {
        Some(cipher) => open_sealed(cipher, raw)?,
        None => raw.to_vec(),
    };
    serde_json::from_slice(&plain).map_err(|e| CacheError::Deserialization(e.to_string()))
}
