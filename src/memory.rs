use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::config::CacheBackend;
use crate::error::CacheError;

/// Options for a cache write.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub expires_at: Option<DateTime<Utc>>,
}

/// Key-value store shared with the rest of the deployment.
#[async_trait]
pub trait DurableCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CacheError>;

    /// Push buffered writes to the backing store.
    async fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Opens the configured backend. An unreachable or unreadable store falls back
/// to an in-process cache so dedupe keeps working from memory.
pub async fn open_cache(backend: &CacheBackend) -> Arc<dyn DurableCache> {
    let opened: Result<Arc<dyn DurableCache>, CacheError> = match backend {
        CacheBackend::File(path) => FileCache::open(path)
            .await
            .map(|c| Arc::new(c) as Arc<dyn DurableCache>),
        CacheBackend::Redis(addr) => RedisCache::connect(addr)
            .await
            .map(|c| Arc::new(c) as Arc<dyn DurableCache>),
        CacheBackend::Memory => return Arc::new(MemoryCache::new()),
    };
    match opened {
        Ok(cache) => cache,
        Err(e) => {
            warn!(backend = ?backend, error = %e, "Durable cache unavailable, keeping state in memory only");
            Arc::new(MemoryCache::new())
        }
    }
}

/// Cache key layout for one platform account.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(platform: &str, account: &str) -> Self {
        CacheKeys {
            prefix: format!("{}/{}", platform, account),
        }
    }

    pub fn processed(&self, item_id: &str) -> String {
        format!("{}/processed/{}", self.prefix, item_id)
    }

    pub fn last_post(&self) -> String {
        format!("{}/lastPost", self.prefix)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn live_value(&self, now: DateTime<Utc>) -> Option<String> {
        match self.expires_at {
            Some(at) if at <= now => None,
            _ => Some(self.value.clone()),
        }
    }
}

/// In-process cache. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).and_then(|e| e.live_value(Utc::now())))
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CacheError> {
        self.entries.lock().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: options.expires_at,
            },
        );
        Ok(())
    }
}

/// JSON file cache under `./storage`.
///
/// Writes land in memory first. A background writer coalesces them and
/// replaces the file through a temp file and rename, so a crash mid-write
/// leaves the previous snapshot intact.
pub struct FileCache {
    state: Arc<FileState>,
    dirty: mpsc::UnboundedSender<()>,
}

struct FileState {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
    write_lock: Mutex<()>,
}

impl FileState {
    async fn save(&self) -> Result<(), CacheError> {
        let _writing = self.write_lock.lock().await;
        let data = {
            let mut entries = self.entries.lock().await;
            let now = Utc::now();
            entries.retain(|_, e| e.live_value(now).is_some());
            serde_json::to_string_pretty(&*entries)?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl FileCache {
    pub const DEFAULT_PATH: &'static str = "./storage/cache.json";
    const FLUSH_DELAY: Duration = Duration::from_millis(250);

    // Load the cache file, starting empty if it does not exist yet
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "Opened file cache");

        let state = Arc::new(FileState {
            path,
            entries: Mutex::new(entries),
            write_lock: Mutex::new(()),
        });
        let (dirty, mut pending) = mpsc::unbounded_channel::<()>();

        let writer = Arc::clone(&state);
        tokio::spawn(async move {
            while pending.recv().await.is_some() {
                tokio::time::sleep(Self::FLUSH_DELAY).await;
                while pending.try_recv().is_ok() {}
                if let Err(e) = writer.save().await {
                    warn!(path = %writer.path.display(), error = %e, "Failed to write cache file");
                }
            }
        });

        Ok(FileCache { state, dirty })
    }
}

#[async_trait]
impl DurableCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.state.entries.lock().await;
        Ok(entries.get(key).and_then(|e| e.live_value(Utc::now())))
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CacheError> {
        self.state.entries.lock().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: options.expires_at,
            },
        );
        self.dirty
            .send(())
            .map_err(|_| CacheError::Backend("cache file writer stopped".to_string()))
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.state.save().await
    }
}

/// Redis-protocol cache through a single mini-redis connection.
pub struct RedisCache {
    client: Mutex<mini_redis::client::Client>,
}

impl RedisCache {
    pub async fn connect(addr: &str) -> Result<Self, CacheError> {
        let client = mini_redis::client::connect(addr)
            .await
            .map_err(|e| CacheError::Backend(format!("connect to {}: {}", addr, e)))?;
        debug!(addr = %addr, "Connected to redis cache");
        Ok(RedisCache {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl DurableCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut client = self.client.lock().await;
        let value = client
            .get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        match value {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| CacheError::Backend(format!("non-utf8 value at {}: {}", key, e))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<(), CacheError> {
        let bytes = Bytes::from(value.to_string());
        let mut client = self.client.lock().await;
        let result = match options.expires_at {
            Some(at) => {
                let ttl = match (at - Utc::now()).to_std() {
                    Ok(ttl) if !ttl.is_zero() => ttl,
                    // Already expired, nothing worth writing
                    _ => return Ok(()),
                };
                client.set_expires(key, bytes, ttl).await
            }
            None => client.set(key, bytes).await,
        };
        result.map_err(|e| CacheError::Backend(e.to_string()))
    }
}
