use impairment_store::FileStore;
use pipeline::impairment_prefix;
use pipeline::impairments::{DELAY_KEY, JITTER_KEY, LOSS_KEY, RATE_KEY};

use super::netem::NetemCommand;
use super::{clab_name, short_interface};
use crate::config::SetArgs;
use crate::error::ServerError;

pub async fn run(args: SetArgs) -> Result<(), ServerError> {
    let store = FileStore::open(args.store.resolve(None)?)?;
    let clab = clab_name(&store)?;
    let interface = short_interface(&args.interface);

    let command = stage(&store, &clab, &interface, &args)?;
    println!("{}", command.render());

    if args.apply {
        if let Err(e) = command.execute().await {
            tracing::error!(error = %e, "netem set failed, resetting interface");
            let reset = NetemCommand::set(&clab, &args.node, &interface);
            if let Err(reset_err) = reset.execute().await {
                tracing::error!(error = %reset_err, "netem reset failed");
            }
            return Err(e);
        }
    }

    store.write()?;
    tracing::info!(node = %args.node, %interface, store = %store.path().display(), "impairments saved");
    Ok(())
}

/// Внести значения в store (ноль удаляет ключ) и собрать netem-команду.
pub(crate) fn stage(
    store: &FileStore,
    clab: &str,
    interface: &str,
    args: &SetArgs,
) -> Result<NetemCommand, ServerError> {
    let prefix = impairment_prefix(&args.node, interface);
    let key = |name: &str| format!("{prefix}{name}");

    let mut command = NetemCommand::set(clab, &args.node, interface);

    put(store, &key(DELAY_KEY), args.delay > 0, args.delay as i64)?;
    command.add_delay(args.delay);

    put(store, &key(JITTER_KEY), args.jitter > 0, args.jitter as i64)?;
    command.add_jitter(args.jitter);

    put(store, &key(LOSS_KEY), args.loss != 0.0, args.loss)?;
    command.add_loss(args.loss);

    put(store, &key(RATE_KEY), args.rate > 0, args.rate as i64)?;
    command.add_rate(args.rate);

    Ok(command)
}

fn put(store: &FileStore, key: &str, present: bool, value: impl Into<toml::Value>) -> Result<(), ServerError> {
    if present {
        store.set_value(key, value)?;
    } else {
        store.delete_value(key);
    }
    Ok(())
}
