use impairment_store::FileStore;
use pipeline::impairment_prefix;
use pipeline::impairments::{DELAY_KEY, JITTER_KEY, LOSS_KEY, RATE_KEY};

use super::netem::NetemCommand;
use super::{clab_name, short_interface};
use crate::config::DeleteArgs;
use crate::error::ServerError;

pub async fn run(args: DeleteArgs) -> Result<(), ServerError> {
    let store = FileStore::open(args.store.resolve(None)?)?;
    let clab = clab_name(&store)?;
    let interface = short_interface(&args.interface);

    let removed = remove_impairments(&store, &args.node, &interface);
    if removed == 0 {
        tracing::warn!(node = %args.node, %interface, "no impairments stored for interface");
    }

    let reset = NetemCommand::set(&clab, &args.node, &interface);
    println!("{}", reset.render());
    if args.apply {
        reset.execute().await?;
    }

    store.write()?;
    tracing::info!(node = %args.node, %interface, removed, "impairments deleted");
    Ok(())
}

/// Удалить все четыре ключа интерфейса. Возвращает число удалённых.
fn remove_impairments(store: &FileStore, node: &str, interface: &str) -> usize {
    let prefix = impairment_prefix(node, interface);
    [DELAY_KEY, JITTER_KEY, LOSS_KEY, RATE_KEY]
        .into_iter()
        .filter(|key| store.delete_value(&format!("{prefix}{key}")))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_interface_and_keeps_neighbours() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("config.toml")).unwrap();
        store.set_value("nodes.XR-1.config.Gi0-0-0-1.impairments.delay", 5_i64).unwrap();
        store.set_value("nodes.XR-1.config.Gi0-0-0-1.impairments.loss", 0.5).unwrap();
        store.set_value("nodes.XR-1.config.Gi0-0-0-2.impairments.rate", 100_i64).unwrap();

        assert_eq!(remove_impairments(&store, "XR-1", "Gi0-0-0-1"), 2);
        assert!(!store.contains_key("nodes.XR-1.config.Gi0-0-0-1"));
        assert!(store.contains_key("nodes.XR-1.config.Gi0-0-0-2"));
        assert_eq!(remove_impairments(&store, "XR-1", "Gi0-0-0-1"), 0);
    }
}
