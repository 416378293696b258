mod error;
mod file;
mod memory;
mod watcher;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use watcher::spawn_watcher;

/// Ключ с именем containerlab-лаборатории.
pub const CLAB_NAME_KEY: &str = "clab-name";
/// Имя лаборатории, если в хранилище его нет.
pub const DEFAULT_CLAB_NAME: &str = "clab-hawkv6";
