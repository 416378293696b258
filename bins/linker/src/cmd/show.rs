use impairment_store::FileStore;
use linker_api::ConfigStore;
use pipeline::impairment_prefix;
use pipeline::impairments::{DELAY_KEY, JITTER_KEY, LOSS_KEY, RATE_KEY};

use super::netem::NetemCommand;
use super::{clab_name, short_interface};
use crate::config::ShowArgs;
use crate::error::ServerError;

const HEADER: [&str; 5] = ["Interface", "Delay", "Jitter", "Packet Loss", "Rate (kbit)"];

pub async fn run(args: ShowArgs) -> Result<(), ServerError> {
    let store = FileStore::open(args.store.resolve(None)?)?;
    if !store.contains_key(&format!("nodes.{}", args.node)) {
        return Err(ServerError::NodeNotFound(args.node));
    }

    let only = args.interface.as_deref().map(short_interface);
    let rows = collect_rows(&store, &args.node, only.as_deref());
    println!("{}", render_table(&rows));

    let clab = clab_name(&store)?;
    let command = NetemCommand::show(&clab, &args.node);
    println!("{}", command.render());
    if args.apply {
        print!("{}", command.execute().await?);
    }
    Ok(())
}

fn collect_rows(store: &FileStore, node: &str, only: Option<&str>) -> Vec<[String; 5]> {
    let mut interfaces = store.child_keys(&format!("nodes.{node}.config"));
    interfaces.sort();
    interfaces
        .into_iter()
        .filter(|iface| only.is_none_or(|o| o == iface.as_str()))
        .map(|iface| {
            let prefix = impairment_prefix(node, &iface);
            let cell = |key: &str| {
                let v = store.get_value(&format!("{prefix}{key}"));
                if v.is_empty() { "-".to_string() } else { v }
            };
            let (delay, jitter, loss, rate) = (cell(DELAY_KEY), cell(JITTER_KEY), cell(LOSS_KEY), cell(RATE_KEY));
            [iface, delay, jitter, loss, rate]
        })
        .collect()
}

/// ASCII-таблица: `+---+` рамки, ширина колонки по самому длинному значению.
fn render_table(rows: &[[String; 5]]) -> String {
    let mut widths = HEADER.map(str::len);
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let border = widths
        .iter()
        .fold(String::from("+"), |acc, w| format!("{acc}{}+", "-".repeat(w + 2)));
    let mut out = vec![border.clone(), table_line(HEADER.iter().copied(), &widths), border.clone()];
    for row in rows {
        out.push(table_line(row.iter().map(String::as_str), &widths));
    }
    out.push(border);
    out.join("\n")
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths.iter().copied())
        .fold(String::from("|"), |acc, (c, w)| format!("{acc} {c:<w$} |"))
}
