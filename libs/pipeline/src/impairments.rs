use std::sync::LazyLock;

use regex::Regex;

use linker_api::{ConfigStore, LinkerError};

// ═══════════════════════════════════════════════════════════════
//  Interface names & store keys
// ═══════════════════════════════════════════════════════════════

static GIGABIT_ETHERNET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^GigabitEthernet([0-9]+)/([0-9]+)/([0-9]+)/([0-9]+)$").expect("static interface pattern")
});

/// `GigabitEthernet0/0/0/1` → `Gi0-0-0-1`.
pub fn canonicalize_interface(name: &str) -> Result<String, LinkerError> {
    let caps = GIGABIT_ETHERNET
        .captures(name)
        .ok_or_else(|| LinkerError::PatternMismatch(name.to_string()))?;
    Ok(format!("Gi{}-{}-{}-{}", &caps[1], &caps[2], &caps[3], &caps[4]))
}

/// Префикс ключей импэрментов интерфейса в store.
pub fn impairment_prefix(node: &str, short_interface: &str) -> String {
    format!("nodes.{node}.config.{short_interface}.impairments.")
}

pub const DELAY_KEY: &str = "delay";
pub const JITTER_KEY: &str = "jitter";
pub const LOSS_KEY: &str = "loss";
pub const RATE_KEY: &str = "rate";

// ═══════════════════════════════════════════════════════════════
//  Lookup
// ═══════════════════════════════════════════════════════════════

/// Импэрменты одного интерфейса, прочитанные из store. Единицы store:
/// delay/jitter: ms, loss: %, rate: kbit/s.
pub struct ImpairmentLookup<'a> {
    store: &'a dyn ConfigStore,
    prefix: String,
}

impl<'a> ImpairmentLookup<'a> {
    /// Канонизировать имя интерфейса и построить префикс.
    pub fn resolve(store: &'a dyn ConfigStore, node: &str, interface_name: &str) -> Result<Self, LinkerError> {
        let short = canonicalize_interface(interface_name)?;
        Ok(Self { store, prefix: impairment_prefix(node, &short) })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// (delay, jitter) в микросекундах; jitter читается только при заданном delay.
    pub fn delay_and_jitter_us(&self) -> Result<(f64, f64), LinkerError> {
        let Some(delay_ms) = self.number(DELAY_KEY)? else {
            return Ok((0.0, 0.0));
        };
        let jitter_ms = self.number(JITTER_KEY)?.unwrap_or(0.0);
        Ok((delay_ms * 1000.0, jitter_ms * 1000.0))
    }

    pub fn loss(&self) -> Result<Option<f64>, LinkerError> {
        self.number(LOSS_KEY)
    }

    pub fn rate(&self) -> Result<Option<f64>, LinkerError> {
        self.number(RATE_KEY)
    }

    /// Пустая строка: значение не задано.
    fn number(&self, name: &str) -> Result<Option<f64>, LinkerError> {
        let key = format!("{}{name}", self.prefix);
        let raw = self.store.get_value(&key);
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>().map(Some).map_err(|_| LinkerError::ValueConversion {
            key,
            value: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impairment_store::MemoryStore;
    use proptest::prelude::*;

    const PREFIX: &str = "nodes.XR-1.config.Gi0-0-0-1.impairments.";

    #[test]
    fn canonical_and_prefix() {
        assert_eq!(canonicalize_interface("GigabitEthernet0/0/0/1").unwrap(), "Gi0-0-0-1");
        assert_eq!(impairment_prefix("XR-1", "Gi0-0-0-1"), PREFIX);
    }

    #[test]
    fn non_gigabit_names_fail() {
        for name in ["Loopback0", "GigabitEthernet0/0/0", "TenGigE0/0/0/1", "xGigabitEthernet0/0/0/1", ""] {
            assert!(
                matches!(canonicalize_interface(name), Err(LinkerError::PatternMismatch(n)) if n == name),
                "{name} should not canonicalize"
            );
        }
    }

    #[test]
    fn only_ascii_digits_are_accepted() {
        for name in ["GigabitEthernet٣/0/0/1", "GigabitEthernet0/0/0/１", "GigabitEthernet0/0/0/१"] {
            assert!(matches!(canonicalize_interface(name), Err(LinkerError::PatternMismatch(_))), "{name}");
        }
    }

    proptest! {
        #[test]
        fn canonicalizer_maps_every_gigabit_name(a in 0u32..10_000, b in 0u32..100, c in 0u32..100, d in 0u32..100) {
            let long = format!("GigabitEthernet{a}/{b}/{c}/{d}");
            prop_assert_eq!(canonicalize_interface(&long).unwrap(), format!("Gi{a}-{b}-{c}-{d}"));
        }

        #[test]
        fn canonicalizer_rejects_other_names(name in "[A-Za-z]{1,12}[0-9/]{0,8}") {
            prop_assume!(!name.starts_with("GigabitEthernet"));
            prop_assert!(canonicalize_interface(&name).is_err());
        }
    }

    #[test]
    fn delay_and_jitter_are_converted_to_microseconds() {
        let store = MemoryStore::with_values([
            (format!("{PREFIX}delay"), "7".to_string()),
            (format!("{PREFIX}jitter"), "1".to_string()),
        ]);
        let lookup = ImpairmentLookup::resolve(&store, "XR-1", "GigabitEthernet0/0/0/1").unwrap();
        assert_eq!(lookup.prefix(), PREFIX);
        assert_eq!(lookup.delay_and_jitter_us().unwrap(), (7000.0, 1000.0));
    }

    #[test]
    fn jitter_without_delay_is_ignored() {
        let store = MemoryStore::with_values([(format!("{PREFIX}jitter"), "5".to_string())]);
        let lookup = ImpairmentLookup::resolve(&store, "XR-1", "GigabitEthernet0/0/0/1").unwrap();
        assert_eq!(lookup.delay_and_jitter_us().unwrap(), (0.0, 0.0));
    }

    #[test]
    fn unset_and_explicit_values() {
        let store = MemoryStore::with_values([(format!("{PREFIX}rate"), "0".to_string())]);
        let lookup = ImpairmentLookup::resolve(&store, "XR-1", "GigabitEthernet0/0/0/1").unwrap();
        assert_eq!(lookup.loss().unwrap(), None);
        assert_eq!(lookup.rate().unwrap(), Some(0.0));
    }

    #[test]
    fn garbage_value_is_a_conversion_error() {
        let store = MemoryStore::with_values([(format!("{PREFIX}loss"), "lots".to_string())]);
        let lookup = ImpairmentLookup::resolve(&store, "XR-1", "GigabitEthernet0/0/0/1").unwrap();
        let err = lookup.loss().unwrap_err();
        assert!(
            matches!(&err, LinkerError::ValueConversion { key, value } if key == &format!("{PREFIX}loss") && value == "lots")
        );
    }
}
