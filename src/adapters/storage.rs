use crate::domain::model::Place;
use crate::domain::ports::{PlaceStore, Storage};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const LOCK_RETRY: Duration = Duration::from_millis(20);
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// A lock file older than this was left behind by a crashed run.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = Path::new(&self.base_path).join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = Path::new(&self.base_path).join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so an interrupted run never leaves a truncated document.
        let tmp_path = full_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &full_path).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        let full_path = Path::new(&self.base_path).join(path);
        tokio::fs::try_exists(full_path).await.unwrap_or(false)
    }

    type Guard = LockFile;

    async fn lock(&self, path: &str) -> Result<LockFile> {
        let lock_path = Path::new(&self.base_path).join(format!("{}.lock", path));
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let deadline = tokio::time::Instant::now() + LOCK_TIMEOUT;
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;
            match created {
                Ok(_) => return Ok(LockFile { path: lock_path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path).await {
                        tracing::warn!("Removing stale lock {}", lock_path.display());
                        // Another waiter may remove it first.
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(EtlError::storage(format!(
                            "timed out waiting for lock {}",
                            lock_path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn lock_is_stale(lock_path: &Path) -> bool {
    match tokio::fs::metadata(lock_path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > LOCK_STALE_AFTER)
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Lock file created next to a document; removed when dropped.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Could not release lock {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Default)]
struct PlaceTable {
    places: Vec<Place>,
    next_id: u64,
}

impl PlaceTable {
    fn from_places(places: Vec<Place>) -> Self {
        let next_id = places
            .iter()
            .filter_map(|p| p.id.as_deref())
            .filter_map(|id| id.strip_prefix("place-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);
        Self { places, next_id }
    }

    fn find_by_external_id(&self, external_id: &str) -> Option<Place> {
        self.places
            .iter()
            .find(|p| p.external_id.as_deref() == Some(external_id))
            .cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Place> {
        self.places.iter().find(|p| p.name == name).cloned()
    }

    fn insert(&mut self, mut place: Place) -> Place {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        place.id = Some(format!("place-{:06}", self.next_id));
        self.next_id += 1;
        self.places.push(place.clone());
        place
    }

    fn update(&mut self, place: &Place) -> Result<Place> {
        let id = place
            .id
            .as_deref()
            .ok_or_else(|| EtlError::storage(format!("cannot update '{}' without id", place.name)))?;
        let slot = self
            .places
            .iter_mut()
            .find(|p| p.id.as_deref() == Some(id))
            .ok_or_else(|| EtlError::storage(format!("no stored place with id {}", id)))?;
        Ok(std::mem::replace(slot, place.clone()))
    }
}

/// Process-local store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryPlaceStore {
    table: Mutex<PlaceTable>,
}

impl InMemoryPlaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places(places: Vec<Place>) -> Self {
        Self {
            table: Mutex::new(PlaceTable::from_places(places)),
        }
    }
}

#[async_trait]
impl PlaceStore for InMemoryPlaceStore {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Place>> {
        Ok(self.table.lock().await.find_by_external_id(external_id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        Ok(self.table.lock().await.find_by_name(name))
    }

    async fn insert(&self, place: Place) -> Result<Place> {
        Ok(self.table.lock().await.insert(place))
    }

    async fn update(&self, place: &Place) -> Result<()> {
        self.table.lock().await.update(place).map(|_| ())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.lock().await.places.len())
    }

    async fn all(&self) -> Result<Vec<Place>> {
        Ok(self.table.lock().await.places.clone())
    }
}

/// Places kept as one JSON document, rewritten after every insert or update.
///
/// Writes re-read the document under the storage lock and apply the change to
/// the current contents, so stores opened by concurrent runs keep each
/// other's inserts. Concurrent updates of the same record are last-write-wins.
pub struct JsonPlaceStore<S: Storage> {
    storage: S,
    document: String,
    table: Mutex<PlaceTable>,
}

impl<S: Storage> JsonPlaceStore<S> {
    pub async fn open(storage: S, document: impl Into<String>) -> Result<Self> {
        let document = document.into();
        let places = load_document(&storage, &document).await?;

        tracing::debug!("Opened place store '{}' with {} places", document, places.len());
        Ok(Self {
            storage,
            document,
            table: Mutex::new(PlaceTable::from_places(places)),
        })
    }

    /// Applies `change` to the stored document and writes it back. The cached
    /// table only moves forward once the write succeeded.
    async fn write_through<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut PlaceTable) -> Result<T> + Send,
        T: Send,
    {
        let mut cached = self.table.lock().await;
        let _guard = self.storage.lock(&self.document).await?;

        let mut table = PlaceTable::from_places(load_document(&self.storage, &self.document).await?);
        if table.places.len() != cached.places.len() {
            tracing::debug!(
                "'{}' changed on disk ({} -> {} places), merging",
                self.document,
                cached.places.len(),
                table.places.len()
            );
        }

        let outcome = change(&mut table)?;
        let data = serde_json::to_vec_pretty(&table.places)?;
        self.storage.write_file(&self.document, &data).await?;
        *cached = table;
        Ok(outcome)
    }
}

async fn load_document<S: Storage>(storage: &S, document: &str) -> Result<Vec<Place>> {
    if !storage.exists(document).await {
        return Ok(Vec::new());
    }
    let bytes = storage.read_file(document).await?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice::<Vec<Place>>(&bytes)?)
}

#[async_trait]
impl<S: Storage> PlaceStore for JsonPlaceStore<S> {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Place>> {
        Ok(self.table.lock().await.find_by_external_id(external_id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        Ok(self.table.lock().await.find_by_name(name))
    }

    async fn insert(&self, place: Place) -> Result<Place> {
        self.write_through(|table| Ok(table.insert(place))).await
    }

    async fn update(&self, place: &Place) -> Result<()> {
        let place = place.clone();
        self.write_through(move |table| table.update(&place).map(|_| ()))
            .await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.lock().await.places.len())
    }

    async fn all(&self) -> Result<Vec<Place>> {
        Ok(self.table.lock().await.places.clone())
    }
}

#[async_trait]
impl<T: PlaceStore + ?Sized> PlaceStore for Arc<T> {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Place>> {
        (**self).find_by_external_id(external_id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Place>> {
        (**self).find_by_name(name).await
    }

    async fn insert(&self, place: Place) -> Result<Place> {
        (**self).insert(place).await
    }

    async fn update(&self, place: &Place) -> Result<()> {
        (**self).update(place).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }

    async fn all(&self) -> Result<Vec<Place>> {
        (**self).all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Coordinate;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap().to_string();

        let store = JsonPlaceStore::open(LocalStorage::new(base.clone()), "places.json")
            .await
            .unwrap();
        let inserted = store
            .insert(
                Place::new("N서울타워", "남산 정상의 전망대")
                    .with_external_id("EXT123")
                    .with_coordinate(Coordinate::new(37.5512, 126.9882).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(inserted.id.as_deref(), Some("place-000001"));

        let reopened = JsonPlaceStore::open(LocalStorage::new(base), "places.json")
            .await
            .unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let found = reopened.find_by_external_id("EXT123").await.unwrap().unwrap();
        assert_eq!(found.name, "N서울타워");

        let next = reopened.insert(Place::new("서울숲", "")).await.unwrap();
        assert_eq!(next.id.as_deref(), Some("place-000002"));
    }

    #[tokio::test]
    async fn test_concurrently_opened_stores_keep_each_others_inserts() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap().to_string();

        let scheduled = JsonPlaceStore::open(LocalStorage::new(base.clone()), "places.json")
            .await
            .unwrap();
        let manual = JsonPlaceStore::open(LocalStorage::new(base.clone()), "places.json")
            .await
            .unwrap();

        let (forest, palace) = tokio::join!(
            scheduled.insert(Place::new("서울숲", "")),
            manual.insert(Place::new("경복궁", "")),
        );
        let forest = forest.unwrap();
        let palace = palace.unwrap();
        assert_ne!(forest.id, palace.id);

        let tower = scheduled.insert(Place::new("N서울타워", "")).await.unwrap();
        assert_eq!(tower.id.as_deref(), Some("place-000003"));

        let reopened = JsonPlaceStore::open(LocalStorage::new(base), "places.json")
            .await
            .unwrap();
        let mut names: Vec<String> = reopened
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["N서울타워", "경복궁", "서울숲"]);
        assert!(!dir.path().join("places.json.lock").exists());
    }

    #[tokio::test]
    async fn test_update_from_stale_store_keeps_newer_inserts() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap().to_string();

        let first = JsonPlaceStore::open(LocalStorage::new(base.clone()), "places.json")
            .await
            .unwrap();
        let mut palace = first.insert(Place::new("경복궁", "")).await.unwrap();

        let second = JsonPlaceStore::open(LocalStorage::new(base.clone()), "places.json")
            .await
            .unwrap();
        second.insert(Place::new("서울숲", "")).await.unwrap();

        palace.description = "조선 왕조의 법궁".to_string();
        first.update(&palace).await.unwrap();
        assert_eq!(first.count().await.unwrap(), 2);

        let reopened = JsonPlaceStore::open(LocalStorage::new(base), "places.json")
            .await
            .unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let found = reopened.find_by_name("경복궁").await.unwrap().unwrap();
        assert_eq!(found.description, "조선 왕조의 법궁");
    }

    #[tokio::test]
    async fn test_lock_waits_for_holder() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap().to_string());

        let held = storage.lock("places.json").await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(100), storage.lock("places.json")).await;
        assert!(waiting.is_err());

        drop(held);
        let reacquired = storage.lock("places.json").await.unwrap();
        drop(reacquired);
        assert!(!dir.path().join("places.json.lock").exists());
    }

    #[tokio::test]
    async fn test_update_requires_known_id() {
        let store = InMemoryPlaceStore::new();
        let err = store.update(&Place::new("ghost", "")).await.unwrap_err();
        assert!(matches!(err, EtlError::StorageError { .. }));
    }

    #[test]
    fn test_in_memory_store_lookup_by_name() {
        let store = InMemoryPlaceStore::with_places(vec![Place::new("경복궁", "")]);
        let found = tokio_test::block_on(store.find_by_name("경복궁")).unwrap();
        assert!(found.is_some());
        assert!(tokio_test::block_on(store.find_by_name("경복")).unwrap().is_none());
    }
}
