use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use linker_api::ConfigStore;

use crate::StoreError;

// ════════════════════════════════════════════════════════════════
//  FileStore
// ════════════════════════════════════════════════════════════════

/// TOML-документ на диске, адресуемый dotted-ключами
/// (`nodes.XR-1.config.Gi0-0-0-1.impairments.delay`).
///
/// Изменения через `set_value` / `delete_value` живут в памяти
/// до явного `write()`. `reload()` перечитывает файл, только если
/// изменился его mtime.
pub struct FileStore {
    path: PathBuf,
    doc: RwLock<toml::Table>,
    modified: Mutex<Option<SystemTime>>,
}

impl FileStore {
    /// Открыть документ. Отсутствующий файл (и каталоги) создаётся пустым.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "store file not found, creating");
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
            }
            std::fs::write(&path, "").map_err(|e| io_err(&path, e))?;
        }

        let doc = read_document(&path)?;
        Ok(Self {
            modified: Mutex::new(modified_at(&path)),
            doc: RwLock::new(doc),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Перечитать файл, если он изменился с последнего чтения/записи.
    /// Возвращает `true`, если документ был заменён.
    pub fn reload(&self) -> Result<bool, StoreError> {
        let current = modified_at(&self.path);
        {
            let seen = self.modified.lock().unwrap_or_else(PoisonError::into_inner);
            if *seen == current {
                return Ok(false);
            }
        }

        let doc = read_document(&self.path)?;
        *self.doc.write().unwrap_or_else(PoisonError::into_inner) = doc;
        *self.modified.lock().unwrap_or_else(PoisonError::into_inner) = current;
        Ok(true)
    }

    /// Есть ли по ключу значение или непустая таблица.
    pub fn contains_key(&self, key: &str) -> bool {
        let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&doc, key).is_some()
    }

    /// Имена дочерних ключей таблицы (пусто, если по `key` не таблица).
    pub fn child_keys(&self, key: &str) -> Vec<String> {
        let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner);
        match lookup(&doc, key) {
            Some(toml::Value::Table(t)) => t.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_value(&self, key: &str, value: impl Into<toml::Value>) -> Result<(), StoreError> {
        let segments = split_key(key)?;
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(StoreError::InvalidKey(key.to_string()));
        };

        let mut doc = self.doc.write().unwrap_or_else(PoisonError::into_inner);
        let mut table: &mut toml::Table = &mut doc;
        for segment in parents {
            let entry = table
                .entry(segment.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()));
            table = match entry {
                toml::Value::Table(t) => t,
                _ => {
                    return Err(StoreError::NotATable {
                        key: key.to_string(),
                        segment: segment.to_string(),
                    });
                }
            };
        }
        table.insert(leaf.to_string(), value.into());
        Ok(())
    }

    /// Удалить ключ; опустевшие родительские таблицы удаляются тоже.
    /// Возвращает `true`, если что-то было удалено.
    pub fn delete_value(&self, key: &str) -> bool {
        let Ok(segments) = split_key(key) else {
            return false;
        };
        let mut doc = self.doc.write().unwrap_or_else(PoisonError::into_inner);
        remove_path(&mut doc, &segments)
    }

    /// Сохранить документ на диск.
    pub fn write(&self) -> Result<(), StoreError> {
        let text = {
            let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner);
            toml::to_string(&*doc)?
        };
        std::fs::write(&self.path, text).map_err(|e| io_err(&self.path, e))?;
        *self.modified.lock().unwrap_or_else(PoisonError::into_inner) = modified_at(&self.path);
        tracing::debug!(path = %self.path.display(), "store written");
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get_value(&self, key: &str) -> String {
        let doc = self.doc.read().unwrap_or_else(PoisonError::into_inner);
        match lookup(&doc, key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(toml::Value::Table(_)) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.to_path_buf(), source }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_document(path: &Path) -> Result<toml::Table, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    text.parse::<toml::Table>()
        .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })
}

fn split_key(key: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut segments = key.split('.');
    let mut current = table.get(segments.next()?)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    match current {
        toml::Value::Table(t) if t.is_empty() => None,
        v => Some(v),
    }
}

fn remove_path(table: &mut toml::Table, segments: &[&str]) -> bool {
    match segments {
        [] => false,
        [leaf] => table.remove(*leaf).is_some(),
        [head, rest @ ..] => {
            let Some(toml::Value::Table(child)) = table.get_mut(*head) else {
                return false;
            };
            let removed = remove_path(child, rest);
            if removed && child.is_empty() {
                table.remove(*head);
            }
            removed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: &str = "nodes.XR-1.config.Gi0-0-0-1.impairments.delay";
    const LOSS: &str = "nodes.XR-1.config.Gi0-0-0-1.impairments.loss";

    #[test]
    fn open_creates_missing_file_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let store = FileStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.get_value(DELAY), "");
    }

    #[test]
    fn values_render_as_plain_strings() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("config.toml")).unwrap();

        store.set_value(DELAY, 10_i64).unwrap();
        store.set_value(LOSS, 0.5).unwrap();
        store.set_value("clab-name", "clab-test").unwrap();

        assert_eq!(store.get_value(DELAY), "10");
        assert_eq!(store.get_value(LOSS), "0.5");
        assert_eq!(store.get_value("clab-name"), "clab-test");
        // таблица: не значение
        assert_eq!(store.get_value("nodes.XR-1"), "");
        assert!(store.contains_key("nodes.XR-1"));
        assert_eq!(store.child_keys("nodes.XR-1.config"), vec!["Gi0-0-0-1".to_string()]);
        assert!(store.child_keys(DELAY).is_empty());
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("config.toml")).unwrap();

        store.set_value(DELAY, 10_i64).unwrap();
        store.set_value(LOSS, 1.5).unwrap();

        assert!(store.delete_value(DELAY));
        assert!(store.contains_key("nodes.XR-1"));
        assert!(store.delete_value(LOSS));
        assert!(!store.contains_key("nodes"));
        assert!(!store.delete_value(LOSS));
    }

    #[test]
    fn set_through_scalar_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("config.toml")).unwrap();

        store.set_value("nodes", 1_i64).unwrap();
        let err = store.set_value("nodes.XR-1.delay", 1_i64).unwrap_err();
        assert!(matches!(err, StoreError::NotATable { .. }));
        assert!(matches!(store.set_value("a..b", 1_i64), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn written_document_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let store = FileStore::open(&path).unwrap();
        store.set_value(DELAY, 25_i64).unwrap();
        store.write().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_value(DELAY), "25");
    }

    #[test]
    fn reload_picks_up_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let store = FileStore::open(&path).unwrap();
        assert!(!store.reload().unwrap());

        std::thread::sleep(std::time::Duration::from_millis(20));
        let writer = FileStore::open(&path).unwrap();
        writer.set_value(DELAY, 7_i64).unwrap();
        writer.write().unwrap();

        assert!(store.reload().unwrap());
        assert_eq!(store.get_value(DELAY), "7");
    }

    #[test]
    fn broken_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "nodes = [").unwrap();

        assert!(matches!(FileStore::open(&path), Err(StoreError::Parse { .. })));
    }
}
