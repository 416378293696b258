pub mod delete;
pub mod netem;
pub mod set;
pub mod show;
pub mod start;

use impairment_store::{CLAB_NAME_KEY, DEFAULT_CLAB_NAME, FileStore};
use linker_api::ConfigStore;

/// Имя лаборатории из store; если не задано: записать значение по умолчанию.
pub(crate) fn clab_name(store: &FileStore) -> Result<String, crate::error::ServerError> {
    let name = store.get_value(CLAB_NAME_KEY);
    if !name.is_empty() {
        return Ok(name);
    }
    store.set_value(CLAB_NAME_KEY, DEFAULT_CLAB_NAME)?;
    Ok(DEFAULT_CLAB_NAME.to_string())
}

/// Короткое имя интерфейса для ключей store (`Gi0-0-0-1`).
pub(crate) fn short_interface(interface: &str) -> String {
    pipeline::canonicalize_interface(interface).unwrap_or_else(|_| interface.to_string())
}
