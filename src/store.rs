use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError},
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::models::{DayOrder, Employee, Property, Task, TaskOrders};

pub const PROPERTIES_FILE: &str = "maisons.json";
pub const EMPLOYEES_FILE: &str = "employes.json";
pub const ORDERS_FILE: &str = "ordre-taches.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid house name: {0:?}")]
    InvalidKey(String),

    #[error("not found: {0}")]
    NotFound(String),
}

// --------------------------------------------------
// Generic JSON files
//
// Writes go to "<file>.tmp" then rename, so a reader
// sees either the old or the new document.
// --------------------------------------------------

pub async fn read_json_or_default<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");

    tokio::fs::write(&tmp_path, text).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

// House names double as storage keys; reject anything that could
// escape the data directory or alias another file.
pub fn validate_key(name: &str) -> Result<(), StoreError> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name.contains("..")
        || name.chars().any(char::is_control);

    if bad {
        return Err(StoreError::InvalidKey(name.to_string()));
    }
    Ok(())
}

// --------------------------------------------------
// Task collections, one per house
// --------------------------------------------------

/// Key-value surface for task collections keyed by house name.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stored tasks; an unknown house has none.
    async fn get(&self, property: &str) -> Result<Vec<Task>, StoreError>;

    /// Replace the whole collection. Must be all-or-nothing.
    async fn put(&self, property: &str, tasks: &[Task]) -> Result<(), StoreError>;
}

/// `planning-<maison>.json` files in one directory.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    dir: PathBuf,
}

impl JsonTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, property: &str) -> Result<PathBuf, StoreError> {
        validate_key(property)?;
        Ok(self.dir.join(format!("planning-{property}.json")))
    }
}

#[async_trait]
impl TaskStore for JsonTaskStore {
    async fn get(&self, property: &str) -> Result<Vec<Task>, StoreError> {
        let path = self.path_for(property)?;
        read_json_or_default(&path).await
    }

    async fn put(&self, property: &str, tasks: &[Task]) -> Result<(), StoreError> {
        let path = self.path_for(property)?;
        write_json_atomic(&path, tasks).await
    }
}

/// In-memory store. Not durable, but good for tests.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<HashMap<String, Vec<Task>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn get(&self, property: &str) -> Result<Vec<Task>, StoreError> {
        validate_key(property)?;
        Ok(self.inner.lock().await.get(property).cloned().unwrap_or_default())
    }

    async fn put(&self, property: &str, tasks: &[Task]) -> Result<(), StoreError> {
        validate_key(property)?;
        self.inner.lock().await.insert(property.to_string(), tasks.to_vec());
        Ok(())
    }
}

// One async mutex per key, created on first use and dropped
// once nobody holds or waits on it.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = Arc::clone(self.table().entry(key.to_string()).or_default());
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.owner.table();
        if table.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
            table.remove(&self.key);
        }
    }
}

/// Task collections with a single writer per house.
///
/// Sync passes and user edits both go through here, so a toggle
/// landing in the middle of a sync is never lost.
pub struct Plannings {
    store: Arc<dyn TaskStore>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for Plannings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plannings").finish_non_exhaustive()
    }
}

impl Plannings {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
        }
    }

    pub async fn get(&self, property: &str) -> Result<Vec<Task>, StoreError> {
        validate_key(property)?;
        self.store.get(property).await
    }

    /// Read, transform and write back under the house's lock.
    pub async fn update<F>(&self, property: &str, f: F) -> Result<Vec<Task>, StoreError>
    where
        F: FnOnce(Vec<Task>) -> Vec<Task> + Send,
    {
        validate_key(property)?;
        let _guard = self.locks.lock(property).await;
        let current = self.store.get(property).await?;
        let next = f(current);
        self.store.put(property, &next).await?;
        Ok(next)
    }

    pub async fn replace(&self, property: &str, tasks: Vec<Task>) -> Result<Vec<Task>, StoreError> {
        self.update(property, move |_| tasks).await
    }

    // Ok(None) when no task has this id; nothing is written then.
    async fn edit_task<F>(&self, property: &str, id: &str, f: F) -> Result<Option<Task>, StoreError>
    where
        F: FnOnce(&mut Task) + Send,
    {
        validate_key(property)?;
        let _guard = self.locks.lock(property).await;
        let mut tasks = self.store.get(property).await?;

        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        f(task);
        let updated = task.clone();

        self.store.put(property, &tasks).await?;
        Ok(Some(updated))
    }

    pub async fn toggle_done(&self, property: &str, id: &str) -> Result<Option<Task>, StoreError> {
        self.edit_task(property, id, |t| t.done = !t.done).await
    }

    pub async fn set_done(&self, property: &str, id: &str, done: bool) -> Result<Option<Task>, StoreError> {
        self.edit_task(property, id, |t| t.done = done).await
    }

    pub async fn assign(&self, property: &str, id: &str, staff: &str) -> Result<Option<Task>, StoreError> {
        let staff = staff.trim().to_string();
        self.edit_task(property, id, move |t| t.assigned_staff = staff).await
    }
}

// --------------------------------------------------
// Houses, staff and daily order
// --------------------------------------------------

/// `maisons.json`: the house list and per-house configuration.
#[derive(Debug)]
pub struct PropertyDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PropertyDirectory {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PROPERTIES_FILE),
            write_lock: Mutex::new(()),
        }
    }

    /// Every readable house; an entry that does not parse is logged and left out.
    pub async fn list(&self) -> Result<Vec<Property>, StoreError> {
        let entries: Vec<serde_json::Value> = read_json_or_default(&self.path).await?;

        let mut properties = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let name = entry.get("nom").and_then(|n| n.as_str()).unwrap_or("?").to_string();
            match serde_json::from_value::<Property>(entry) {
                Ok(p) => properties.push(p),
                Err(e) => warn!(index, house = %name, error = %e, "skipping unreadable house entry"),
            }
        }
        Ok(properties)
    }

    pub async fn get(&self, name: &str) -> Result<Property, StoreError> {
        self.list()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    pub async fn save_all(&self, properties: &[Property]) -> Result<(), StoreError> {
        for p in properties {
            validate_key(&p.name)?;
        }
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.path, properties).await
    }

    // Only the house entry goes away; its planning file is kept.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        // raw entries, so unreadable neighbours survive the rewrite
        let mut properties: Vec<serde_json::Value> = read_json_or_default(&self.path).await?;

        let before = properties.len();
        properties.retain(|p| p.get("id").and_then(|v| v.as_str()) != Some(id));
        if properties.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }

        write_json_atomic(&self.path, &properties).await
    }
}

/// `employes.json` and `ordre-taches.json`.
#[derive(Debug)]
pub struct StaffBook {
    employees_path: PathBuf,
    orders_path: PathBuf,
    write_lock: Mutex<()>,
}

impl StaffBook {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            employees_path: data_dir.join(EMPLOYEES_FILE),
            orders_path: data_dir.join(ORDERS_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn employees(&self) -> Result<Vec<Employee>, StoreError> {
        read_json_or_default(&self.employees_path).await
    }

    pub async fn save_employees(&self, employees: &[Employee]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.employees_path, employees).await
    }

    pub async fn day_order(&self, date: &str) -> Result<DayOrder, StoreError> {
        let mut all: TaskOrders = read_json_or_default(&self.orders_path).await?;
        Ok(all.remove(date).unwrap_or_default())
    }

    // Other staff's order for the same day is left as is.
    pub async fn save_order(&self, date: &str, employee: &str, order: Vec<String>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all: TaskOrders = read_json_or_default(&self.orders_path).await?;
        all.entry(date.to_string())
            .or_default()
            .insert(employee.to_string(), order);
        write_json_atomic(&self.orders_path, &all).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "🧼 Ménage".to_string(),
            property_name: "Villa".to_string(),
            date: "2024-03-05".to_string(),
            scheduled_time: "10:00".to_string(),
            duration_label: "5j 7h".to_string(),
            color_tag: "#999999".to_string(),
            cleaning_minutes: 60,
            done: false,
            assigned_staff: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_planning_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(store.get("Villa").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn planning_file_uses_original_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonTaskStore::new(dir.path());
        store.put("Villa", &[task("a")]).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("planning-Villa.json")).unwrap();
        assert!(raw.contains("\"maison\""));
        assert!(raw.contains("\"employe\""));
        assert!(raw.contains("\"tempsMenage\""));
        assert!(!dir.path().join("planning-Villa.json.tmp").exists());

        assert_eq!(store.get("Villa").await.unwrap(), vec![task("a")]);
    }

    #[tokio::test]
    async fn corrupt_planning_is_an_error_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("planning-Villa.json"), "[{ broken").unwrap();
        let store = JsonTaskStore::new(dir.path());
        assert!(matches!(store.get("Villa").await, Err(StoreError::Json(_))));
    }

    #[test]
    fn keys_that_escape_the_directory_are_rejected() {
        for name in ["", "  ", "../x", "a/b", "a\\b", "bad\nname"] {
            assert!(validate_key(name).is_err(), "{name:?} accepted");
        }
        assert!(validate_key("Villa Les Pins").is_ok());
    }

    #[tokio::test]
    async fn edits_touch_only_user_fields() {
        let plannings = Plannings::new(Arc::new(MemoryTaskStore::new()));
        plannings.replace("Villa", vec![task("a"), task("b")]).await.unwrap();

        let t = plannings.toggle_done("Villa", "b").await.unwrap().unwrap();
        assert!(t.done);
        let t = plannings.assign("Villa", "b", " Alice ").await.unwrap().unwrap();
        assert_eq!(t.assigned_staff, "Alice");
        let t = plannings.set_done("Villa", "b", false).await.unwrap().unwrap();
        assert!(!t.done);

        let stored = plannings.get("Villa").await.unwrap();
        assert_eq!(stored[0], task("a"));
        assert_eq!(stored[1].assigned_staff, "Alice");
    }

    #[tokio::test]
    async fn edit_of_unknown_task_writes_nothing() {
        let plannings = Plannings::new(Arc::new(MemoryTaskStore::new()));
        assert!(plannings.toggle_done("Villa", "nope").await.unwrap().is_none());
        assert!(plannings.get("Villa").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_edits_are_not_lost() {
        let plannings = Arc::new(Plannings::new(Arc::new(MemoryTaskStore::new())));
        let ids: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        plannings
            .replace("Villa", ids.iter().map(|id| task(id)).collect())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for id in ids {
            let plannings = Arc::clone(&plannings);
            handles.push(tokio::spawn(async move {
                plannings.set_done("Villa", &id, true).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let stored = plannings.get("Villa").await.unwrap();
        assert!(stored.iter().all(|t| t.done));
        assert_eq!(plannings.locks.len(), 0);
    }

    #[tokio::test]
    async fn invalid_names_never_create_locks() {
        let plannings = Plannings::new(Arc::new(MemoryTaskStore::new()));

        for name in ["../etc", "a/b", "", "x\\y"] {
            let err = plannings.toggle_done(name, "t0").await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)));
            let err = plannings.replace(name, vec![]).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)));
        }
        assert_eq!(plannings.locks.len(), 0);

        // unknown but valid houses leave nothing behind either
        for i in 0..50 {
            assert!(plannings.assign(&format!("house-{i}"), "t0", "Alice").await.unwrap().is_none());
        }
        assert_eq!(plannings.locks.len(), 0);
    }

    #[tokio::test]
    async fn property_directory_crud() {
        let dir = tempfile::tempdir().unwrap();
        let houses = PropertyDirectory::new(dir.path());
        assert!(houses.list().await.unwrap().is_empty());

        let villa = Property::new("Villa");
        let chalet = Property::new("Chalet");
        houses.save_all(&[villa.clone(), chalet.clone()]).await.unwrap();

        assert_eq!(houses.get("Chalet").await.unwrap(), chalet);
        assert!(matches!(houses.get("Mas").await, Err(StoreError::NotFound(_))));

        houses.delete(&villa.id).await.unwrap();
        assert_eq!(houses.list().await.unwrap(), vec![chalet]);
        assert!(matches!(houses.delete(&villa.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn unreadable_house_entry_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROPERTIES_FILE),
            r#"[
                {"id": "v1", "nom": "Villa", "tempsMenage": "90"},
                {"id": "m1", "nom": "Mas", "tempsMenage": "a lot"},
                {"id": "x1"},
                {"id": "c1", "nom": "Chalet", "tempsMenage": 45.0}
            ]"#,
        )
        .unwrap();
        let houses = PropertyDirectory::new(dir.path());

        let list = houses.list().await.unwrap();
        let names: Vec<&str> = list.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Villa", "Chalet"]);
        assert_eq!(list[0].cleaning_minutes(), 90);
        assert_eq!(list[1].cleaning_minutes(), 45);

        // deleting a neighbour keeps the unreadable entries on disk
        houses.delete("c1").await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join(PROPERTIES_FILE)).unwrap();
        assert!(raw.contains("\"m1\""));
        assert!(raw.contains("\"x1\""));
        assert!(!raw.contains("\"c1\""));
    }

    #[tokio::test]
    async fn saving_a_house_with_a_path_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        let houses = PropertyDirectory::new(dir.path());
        let err = houses.save_all(&[Property::new("../etc")]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn day_order_keeps_other_staff() {
        let dir = tempfile::tempdir().unwrap();
        let book = StaffBook::new(dir.path());

        book.save_order("2024-03-05", "Alice", vec!["a".into(), "b".into()]).await.unwrap();
        book.save_order("2024-03-05", "Bob", vec!["c".into()]).await.unwrap();
        book.save_order("2024-03-05", "Alice", vec!["b".into(), "a".into()]).await.unwrap();

        let order = book.day_order("2024-03-05").await.unwrap();
        assert_eq!(order["Alice"], vec!["b", "a"]);
        assert_eq!(order["Bob"], vec!["c"]);
        assert!(book.day_order("2024-03-06").await.unwrap().is_empty());
    }
}
