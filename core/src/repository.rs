use crate::backend::Backend;
use crate::crypto::{Encryptor, MasterKey};
use crate::index::{Index, IndexFile};
use crate::pack::FinishedPack;
use crate::snapshot::Snapshot;
use crate::{Error, KdfParams, ObjectID, PackID, RepoConfig, Result, SnapshotID};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONFIG_PATH: &str = "config";
const KEYS_DIR: &str = "keys";
const INDEX_DIR: &str = "index";
const SNAPSHOTS_DIR: &str = "snapshots";
const DATA_DIR: &str = "data";

/// Index fragments fetched concurrently while building the index.
const INDEX_LOAD_CONCURRENCY: usize = 8;

/// An unlocked repository on top of a [`Backend`].
///
/// # Repository Structure
///
/// ```text
/// repository/
/// ├── config          # Repository configuration
/// ├── keys/           # Encrypted data keys
/// ├── data/           # Packs of sealed blobs
/// ├── index/          # Index fragments locating blobs inside packs
/// └── snapshots/      # Snapshot records
/// ```
///
/// Snapshots and index fragments are named by the blake3 digest of their plaintext
/// JSON; packs are named by the digest of their stored bytes.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tidesnap_core::{MemoryBackend, Repository, Session};
///
/// #[tokio::main]
/// async fn main() -> tidesnap_core::Result<()> {
///     let backend = Arc::new(MemoryBackend::new());
///     Repository::init(backend.clone(), "my-password").await?;
///
///     let repo = Repository::open(backend, "my-password").await?;
///     let session = Session::open(repo).await?;
///     println!("{} blobs indexed", session.index().len());
///     Ok(())
/// }
/// ```
pub struct Repository {
    backend: Arc<dyn Backend>,
    config: RepoConfig,
    encryptor: Arc<Encryptor>,
}

impl Repository {
    /// Initializes a new repository with default key derivation parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::RepositoryExists` if the backend already holds a `config`.
    pub async fn init(backend: Arc<dyn Backend>, password: &str) -> Result<Self> {
        Self::init_with_params(backend, password, KdfParams::default()).await
    }

    pub async fn init_with_params(
        backend: Arc<dyn Backend>,
        password: &str,
        kdf_params: KdfParams,
    ) -> Result<Self> {
        if backend.exists(CONFIG_PATH).await? {
            return Err(Error::RepositoryExists {
                path: CONFIG_PATH.to_string(),
            });
        }
        backend.init().await?;

        let config = RepoConfig {
            kdf_params,
            ..RepoConfig::default()
        };

        let master_key = MasterKey::derive_from_password(password, &config.kdf_params.salt, &config.kdf_params)?;
        let data_key = MasterKey::generate();
        let encryptor = Encryptor::new(data_key.as_bytes())?;

        let key_encryptor = Encryptor::new(master_key.as_bytes())?;
        let key_file = KeyFile {
            encrypted_key: key_encryptor.encrypt(data_key.as_bytes())?,
            kdf_params: config.kdf_params.clone(),
        };

        let key_id = uuid::Uuid::new_v4().to_string();
        backend
            .write(&format!("{}/{}", KEYS_DIR, key_id), Bytes::from(serde_json::to_vec_pretty(&key_file)?))
            .await?;
        backend
            .write(CONFIG_PATH, Bytes::from(serde_json::to_vec_pretty(&config)?))
            .await?;

        info!(repository = %config.id, "Initialized repository");
        Ok(Self {
            backend,
            config,
            encryptor: Arc::new(encryptor),
        })
    }

    /// Opens an existing repository and unlocks its data key.
    ///
    /// # Errors
    ///
    /// * `Error::RepositoryNotFound` - the backend holds no `config`
    /// * `Error::InvalidFormatVersion` - unsupported repository version
    /// * `Error::InvalidPassword` - no key file opens with `password`
    pub async fn open(backend: Arc<dyn Backend>, password: &str) -> Result<Self> {
        if !backend.exists(CONFIG_PATH).await? {
            return Err(Error::RepositoryNotFound {
                path: CONFIG_PATH.to_string(),
            });
        }

        let config: RepoConfig = serde_json::from_slice(&backend.read(CONFIG_PATH).await?)?;
        if config.version != 1 {
            return Err(Error::InvalidFormatVersion {
                version: config.version,
            });
        }

        for key_path in backend.list(KEYS_DIR).await? {
            let key_file: KeyFile = match serde_json::from_slice(&backend.read(&key_path).await?) {
                Ok(kf) => kf,
                Err(e) => {
                    warn!(key = %key_path, error = %e, "Skipping unreadable key file");
                    continue;
                }
            };

            let master_key =
                MasterKey::derive_from_password(password, &key_file.kdf_params.salt, &key_file.kdf_params)?;
            let key_encryptor = Encryptor::new(master_key.as_bytes())?;
            if let Ok(data_key) = key_encryptor.decrypt(&key_file.encrypted_key) {
                debug!(key = %key_path, "Unlocked repository key");
                return Ok(Self {
                    backend,
                    config,
                    encryptor: Arc::new(Encryptor::new(&data_key)?),
                });
            }
        }

        Err(Error::InvalidPassword)
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn encryptor(&self) -> &Arc<Encryptor> {
        &self.encryptor
    }

    pub async fn list_index_fragments(&self) -> Result<Vec<ObjectID>> {
        self.list_ids(INDEX_DIR).await
    }

    pub async fn load_index_fragment(&self, id: ObjectID) -> Result<IndexFile> {
        let data = self.backend.read(&object_path(INDEX_DIR, &id)).await?;
        open_json(id, &data, &self.encryptor)
    }

    /// Loads every index fragment and merges them. Fails as a whole if any fragment fails.
    pub async fn load_index(&self) -> Result<Index> {
        let ids = self.list_index_fragments().await?;
        let fragments: Vec<(ObjectID, IndexFile)> = futures::stream::iter(ids)
            .map(|id| async move { Ok::<_, Error>((id, self.load_index_fragment(id).await?)) })
            .buffer_unordered(INDEX_LOAD_CONCURRENCY)
            .try_collect()
            .await?;

        let fragment_count = fragments.len();
        let index = Index::from_fragments(fragments);
        info!(
            fragments = fragment_count,
            blobs = index.len(),
            conflicts = index.conflicts(),
            "Loaded repository index"
        );
        Ok(index)
    }

    pub async fn save_index(&self, file: &IndexFile) -> Result<ObjectID> {
        let (id, data) = seal_json(file, &self.encryptor)?;
        self.backend.write(&object_path(INDEX_DIR, &id), data).await?;
        debug!(fragment = %id.short_string(), packs = file.packs.len(), "Saved index fragment");
        Ok(id)
    }

    pub async fn save_pack(&self, pack: &FinishedPack) -> Result<()> {
        self.backend.write(&pack_path(&pack.id), pack.data.clone()).await?;
        debug!(pack = %pack.id.short_string(), blobs = pack.blobs.len(), "Saved pack");
        Ok(())
    }

    /// Fetches a raw, still sealed byte range from a pack.
    pub async fn read_pack_range(&self, pack_id: &PackID, offset: u64, length: u64) -> Result<Bytes> {
        self.backend.read_range(&pack_path(pack_id), offset, length).await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotID>> {
        self.list_ids(SNAPSHOTS_DIR).await
    }

    pub async fn load_snapshot(&self, id: &SnapshotID) -> Result<Snapshot> {
        let data = match self.backend.read(&object_path(SNAPSHOTS_DIR, id)).await {
            Ok(data) => data,
            Err(e) if e.is_missing_object() => {
                return Err(Error::SnapshotNotFound {
                    reference: id.to_hex(),
                });
            }
            Err(e) => return Err(e),
        };
        open_json(*id, &data, &self.encryptor)
    }

    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotID> {
        let (id, data) = seal_json(snapshot, &self.encryptor)?;
        self.backend.write(&object_path(SNAPSHOTS_DIR, &id), data).await?;
        info!(snapshot = %id.short_string(), "Saved snapshot");
        Ok(id)
    }

    async fn list_ids(&self, dir: &str) -> Result<Vec<ObjectID>> {
        let mut ids = Vec::new();
        for path in self.backend.list(dir).await? {
            let name = path.rsplit('/').next().unwrap_or(&path);
            match name.parse::<ObjectID>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(path = %path, "Ignoring object with non-id name"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn object_path(dir: &str, id: &ObjectID) -> String {
    format!("{}/{}", dir, id.to_hex())
}

fn pack_path(id: &PackID) -> String {
    format!("{}/{}.pack", DATA_DIR, id.to_hex())
}

/// Encrypts the JSON form of `value`; the id is the digest of the plaintext.
fn seal_json<T: Serialize>(value: &T, encryptor: &Encryptor) -> Result<(ObjectID, Bytes)> {
    let json = serde_json::to_vec(value)?;
    let id = ObjectID::from_data(&json);
    Ok((id, Bytes::from(encryptor.encrypt(&json)?)))
}

fn open_json<T: DeserializeOwned>(id: ObjectID, data: &[u8], encryptor: &Encryptor) -> Result<T> {
    let json = encryptor
        .decrypt(data)
        .map_err(|_| Error::integrity(id, "record failed authentication"))?;
    if ObjectID::from_data(&json) != id {
        return Err(Error::integrity(id, "record content does not match its name"));
    }
    serde_json::from_slice(&json).map_err(|e| Error::integrity(id, format!("unreadable record: {}", e)))
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    encrypted_key: Vec<u8>,
    kdf_params: KdfParams,
}
