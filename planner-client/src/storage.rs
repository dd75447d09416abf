//! Ключ-значение хранилище для локального состояния клиента.
//!
//! Интерфейс повторяет `localStorage`: строки по строковым ключам. Значения
//! коллекций кладутся в хранилище JSON-строками.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

/// Ключ JWT-токена.
pub const TOKEN_KEY: &str = "token";
/// Ключ зеркала постов.
pub const POSTS_KEY: &str = "posts";
/// Ключ зеркала планов.
pub const PLANS_KEY: &str = "plans";
/// Ключ зеркала участников планов.
pub const PARTICIPANTS_KEY: &str = "participants";
/// Ключ счётчиков следующих id постов и планов.
pub const NEXT_IDS_KEY: &str = "next_ids";

#[derive(Debug, Error)]
/// Ошибки локального хранилища.
pub enum StorageError {
    /// Ошибка файловой системы.
    #[error("storage io error for key '{key}': {source}")]
    Io {
        /// Ключ, на котором произошла ошибка.
        key: String,
        /// Исходная ошибка.
        #[source]
        source: io::Error,
    },

    /// Значение не удалось (де)сериализовать.
    #[error("storage value for key '{key}' is not valid json: {source}")]
    Serde {
        /// Ключ, на котором произошла ошибка.
        key: String,
        /// Исходная ошибка.
        #[source]
        source: serde_json::Error,
    },

    /// Недопустимое имя ключа.
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Результат операций хранилища.
pub type StorageResult<T> = Result<T, StorageError>;

/// Хранилище строк по ключу.
pub trait Storage: Send + Sync {
    /// Возвращает значение по ключу или `None`, если ключа нет.
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    /// Записывает значение по ключу (перезаписывая старое).
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Удаляет ключ. Отсутствующий ключ не считается ошибкой.
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

#[derive(Debug, Default)]
/// Хранилище в памяти процесса.
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Создаёт пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Хранилище в каталоге: по одному файлу `<key>.json` на ключ.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Открывает (и при необходимости создаёт) каталог хранилища.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Каталог хранилища.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        // Пишем во временный файл и переименовываем, чтобы не оставить обрезанный JSON.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

pub(crate) fn read_json<T>(storage: &dyn Storage, key: &str) -> StorageResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let Some(raw) = storage.get_item(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StorageError::Serde {
            key: key.to_string(),
            source,
        })
}

pub(crate) fn write_json<T>(storage: &dyn Storage, key: &str, value: &T) -> StorageResult<()>
where
    T: serde::Serialize,
{
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serde {
        key: key.to_string(),
        source,
    })?;
    storage.set_item(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").expect("get"), None);

        storage.set_item("k", "v").expect("set");
        assert_eq!(storage.get_item("k").expect("get").as_deref(), Some("v"));

        storage.remove_item("k").expect("remove");
        assert_eq!(storage.get_item("k").expect("get"), None);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::open(dir.path()).expect("open");

        let err = storage.set_item("../escape", "x").expect_err("must reject");
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[test]
    fn file_storage_roundtrips_value_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::open(dir.path()).expect("open");

        storage.set_item(POSTS_KEY, "[]").expect("set");
        assert!(dir.path().join("posts.json").exists());

        let reopened = FileStorage::open(dir.path()).expect("reopen");
        assert_eq!(reopened.get_item(POSTS_KEY).expect("get").as_deref(), Some("[]"));

        reopened.remove_item(POSTS_KEY).expect("remove");
        reopened.remove_item(POSTS_KEY).expect("second remove is a no-op");
        assert_eq!(reopened.get_item(POSTS_KEY).expect("get"), None);
    }

    #[test]
    fn read_json_reports_broken_value() {
        let storage = MemoryStorage::new();
        storage.set_item(PLANS_KEY, "{not-json").expect("set");

        let err = read_json::<Vec<i64>>(&storage, PLANS_KEY).expect_err("must fail");
        assert!(matches!(err, StorageError::Serde { .. }));
    }
}
