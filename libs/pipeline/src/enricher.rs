use std::sync::Arc;

use rand::Rng;

use linker_api::{
    BandwidthMessage, ConfigStore, DecodeError, DelayMessage, LinkerError, LossMessage, Message,
};

use crate::impairments::ImpairmentLookup;

// ═══════════════════════════════════════════════════════════════
//  Perturbation model
// ═══════════════════════════════════════════════════════════════

pub const DELAY_SCALE: f64 = 0.05;
pub const LOSS_SCALE: f64 = 0.1;
/// Потери на интерфейсе без заданного `loss` (%), чтобы выход не был ровным нулём.
pub const DEFAULT_LOSS_PERCENTAGE: f64 = 1e-4;
/// Полоса интерфейса без заданного `rate`, kbit/s (1 Gbit/s).
pub const DEFAULT_BANDWIDTH_KBPS: f64 = 1_000_000.0;

/// `(log10(x + 1) * 0.2 - 0.1) * scale * u`, `u ∈ [-1, 1)`.
pub fn random_factor(magnitude: f64, scale: f64, u: f64) -> f64 {
    ((magnitude + 1.0).log10() * 0.2 - 0.1) * scale * u
}

/// Статистика задержки после наложения импэрмента, µs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayStats {
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
    pub variance: f64,
}

/// `delay_us` / `jitter_us` уже в микросекундах; 0: не задано.
pub fn apply_delay(average: f64, delay_us: f64, jitter_us: f64, factor: f64) -> DelayStats {
    let average = if delay_us == 0.0 {
        average + average * factor
    } else {
        average + (delay_us + delay_us * factor)
    };

    if jitter_us == 0.0 {
        let spread = (average * factor).abs();
        let maximum = average + spread;
        let minimum = (average - spread).max(0.0);
        DelayStats { average, maximum, minimum, variance: maximum - minimum }
    } else {
        DelayStats {
            average,
            maximum: average + jitter_us / 2.0,
            minimum: (average - jitter_us / 2.0).max(0.0),
            variance: jitter_us,
        }
    }
}

pub fn apply_loss(loss: f64, factor: f64) -> f64 {
    loss + loss * factor
}

/// Заданный `rate` (включая явный 0) заменяет измеренную полосу.
pub fn apply_bandwidth(rate: Option<f64>) -> f64 {
    rate.unwrap_or(DEFAULT_BANDWIDTH_KBPS)
}

// ═══════════════════════════════════════════════════════════════
//  FactorSource
// ═══════════════════════════════════════════════════════════════

/// Источник равномерной величины `u ∈ [-1, 1)`, перетягивается на каждое сообщение.
pub trait FactorSource: Send + Sync {
    fn draw(&self) -> f64;
}

/// Thread-local RNG из `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngFactor;

impl FactorSource for ThreadRngFactor {
    fn draw(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..1.0)
    }
}

/// Всегда одно и то же `u`. Для детерминированных прогонов.
#[derive(Debug, Clone, Copy)]
pub struct FixedFactor(pub f64);

impl FactorSource for FixedFactor {
    fn draw(&self) -> f64 {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════
//  Enricher
// ═══════════════════════════════════════════════════════════════

/// Накладывает импэрменты из store на типизированные сообщения.
///
/// Ключ поиска: `tags.source` + каноническое имя интерфейса. Между
/// сообщениями состояния нет, кроме чтения store.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn ConfigStore>,
    factors: Arc<dyn FactorSource>,
}

impl Enricher {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_factor_source(store, Arc::new(ThreadRngFactor))
    }

    pub fn with_factor_source(store: Arc<dyn ConfigStore>, factors: Arc<dyn FactorSource>) -> Self {
        Self { store, factors }
    }

    pub fn enrich(&self, message: Message) -> Result<Message, LinkerError> {
        match message {
            Message::Delay(m) => self.enrich_delay(m).map(Message::Delay),
            Message::Loss(m) => self.enrich_loss(m).map(Message::Loss),
            Message::Bandwidth(m) => self.enrich_bandwidth(m).map(Message::Bandwidth),
            Message::Unknown(env) => Err(DecodeError::UnknownKind(env.name).into()),
        }
    }

    fn lookup(&self, tags: &linker_api::MessageTags) -> Result<ImpairmentLookup<'_>, LinkerError> {
        ImpairmentLookup::resolve(&*self.store, &tags.source, &tags.interface_name)
    }

    fn enrich_delay(&self, mut msg: DelayMessage) -> Result<DelayMessage, LinkerError> {
        let (delay_us, jitter_us) = self.lookup(&msg.envelope.tags)?.delay_and_jitter_us()?;
        let factor = random_factor(delay_us, DELAY_SCALE, self.factors.draw());

        let stats = apply_delay(msg.average, delay_us, jitter_us, factor);
        tracing::debug!(
            source = %msg.envelope.tags.source,
            interface = %msg.envelope.tags.interface_name,
            delay_us, jitter_us, average = stats.average,
            "delay adjusted"
        );
        msg.average = stats.average;
        msg.maximum = stats.maximum;
        msg.minimum = stats.minimum;
        msg.variance = stats.variance;
        Ok(msg)
    }

    fn enrich_loss(&self, mut msg: LossMessage) -> Result<LossMessage, LinkerError> {
        let configured = self.lookup(&msg.envelope.tags)?.loss()?;
        let factor = random_factor(configured.unwrap_or(0.0), LOSS_SCALE, self.factors.draw());

        msg.loss_percentage = apply_loss(configured.unwrap_or(DEFAULT_LOSS_PERCENTAGE), factor);
        tracing::debug!(
            source = %msg.envelope.tags.source,
            interface = %msg.envelope.tags.interface_name,
            loss = msg.loss_percentage,
            "loss adjusted"
        );
        Ok(msg)
    }

    fn enrich_bandwidth(&self, mut msg: BandwidthMessage) -> Result<BandwidthMessage, LinkerError> {
        let rate = self.lookup(&msg.envelope.tags)?.rate()?;
        msg.bandwidth = apply_bandwidth(rate);
        tracing::debug!(
            source = %msg.envelope.tags.source,
            interface = %msg.envelope.tags.interface_name,
            bandwidth = msg.bandwidth,
            "bandwidth adjusted"
        );
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impairment_store::MemoryStore;
    use linker_api::{MessageTags, TelemetryEnvelope};

    const PREFIX: &str = "nodes.XR-1.config.Gi0-0-0-1.impairments.";

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn envelope(interface_name: &str) -> TelemetryEnvelope {
        TelemetryEnvelope {
            name: "isis".into(),
            tags: MessageTags {
                host: "telegraf".into(),
                interface_name: interface_name.into(),
                source: "XR-1".into(),
                ..Default::default()
            },
            timestamp: 1704728135,
            ..Default::default()
        }
    }

    fn enricher(values: &[(&str, &str)], u: f64) -> Enricher {
        let store = MemoryStore::with_values(values.iter().map(|(k, v)| (format!("{PREFIX}{k}"), *v)));
        Enricher::with_factor_source(Arc::new(store), Arc::new(FixedFactor(u)))
    }

    #[test]
    fn identity_without_impairment_or_noise() {
        let s = apply_delay(3000.0, 0.0, 0.0, 0.0);
        assert_eq!(s, DelayStats { average: 3000.0, maximum: 3000.0, minimum: 3000.0, variance: 0.0 });
    }

    #[test]
    fn delay_without_jitter() {
        let s = apply_delay(3000.0, 7000.0, 0.0, 0.1);
        approx(s.average, 10700.0);
        approx(s.maximum, 11770.0);
        approx(s.minimum, 9630.0);
        approx(s.variance, 2140.0);
    }

    #[test]
    fn delay_with_jitter() {
        let s = apply_delay(3000.0, 7000.0, 1000.0, 0.1);
        approx(s.average, 10700.0);
        approx(s.maximum, 11200.0);
        approx(s.minimum, 10200.0);
        approx(s.variance, 1000.0);
    }

    #[test]
    fn minimum_never_goes_negative() {
        let s = apply_delay(100.0, 0.0, 0.0, -1.5);
        assert_eq!(s.minimum, 0.0);
        let s = apply_delay(100.0, 0.0, 1000.0, 0.0);
        assert_eq!(s.minimum, 0.0);
        assert_eq!(s.variance, 1000.0);
    }

    #[test]
    fn loss_rule() {
        approx(apply_loss(1.0, 0.1), 1.1);
        assert_eq!(apply_loss(0.0, 0.1), 0.0);
    }

    #[test]
    fn bandwidth_rule() {
        assert_eq!(apply_bandwidth(Some(0.0)), 0.0);
        assert_eq!(apply_bandwidth(Some(10_000.0)), 10_000.0);
        assert_eq!(apply_bandwidth(None), DEFAULT_BANDWIDTH_KBPS);
    }

    #[test]
    fn factor_is_bounded_by_scale() {
        for x in [0.0, 1.0, 10.0, 1000.0, 100_000.0] {
            for u in [-1.0, -0.5, 0.0, 0.5, 0.999] {
                let f = random_factor(x, DELAY_SCALE, u);
                let bound = ((x + 1.0_f64).log10() * 0.2 - 0.1).abs() * DELAY_SCALE;
                assert!(f.abs() <= bound + 1e-12);
            }
        }
        assert_eq!(random_factor(9.0, LOSS_SCALE, 0.0), 0.0);
    }

    #[test]
    fn independent_draws_differ_only_by_noise() {
        let delay_us = 7000.0;
        let a = apply_delay(3000.0, delay_us, 0.0, random_factor(delay_us, DELAY_SCALE, -0.8));
        let b = apply_delay(3000.0, delay_us, 0.0, random_factor(delay_us, DELAY_SCALE, 0.6));
        let deterministic = 3000.0 + delay_us;
        let max_noise = ((delay_us + 1.0_f64).log10() * 0.2 - 0.1).abs() * DELAY_SCALE * delay_us;
        assert!((a.average - deterministic).abs() <= max_noise);
        assert!((b.average - deterministic).abs() <= max_noise);
        assert!((a.average - b.average).abs() <= 2.0 * max_noise);
    }

    #[test]
    fn thread_rng_stays_in_range() {
        let source = ThreadRngFactor;
        for _ in 0..1000 {
            let u = source.draw();
            assert!((-1.0..1.0).contains(&u));
        }
    }

    #[test]
    fn enrich_delay_reads_store_in_milliseconds() {
        let e = enricher(&[("delay", "7"), ("jitter", "1")], 0.0);
        let msg = Message::Delay(DelayMessage {
            envelope: envelope("GigabitEthernet0/0/0/1"),
            average: 3000.0,
            maximum: 0.0,
            minimum: 0.0,
            variance: 0.0,
        });
        let Message::Delay(out) = e.enrich(msg).unwrap() else { panic!("kind changed") };
        approx(out.average, 10_000.0);
        approx(out.maximum, 10_500.0);
        approx(out.minimum, 9_500.0);
        approx(out.variance, 1_000.0);
        assert_eq!(out.envelope.tags.interface_name, "GigabitEthernet0/0/0/1");
        assert_eq!(out.envelope.tags.source, "XR-1");
    }

    #[test]
    fn enrich_loss_defaults_to_epsilon() {
        let e = enricher(&[], 0.5);
        let msg = Message::Loss(LossMessage { envelope: envelope("GigabitEthernet0/0/0/1"), loss_percentage: 0.0 });
        let Message::Loss(out) = e.enrich(msg).unwrap() else { panic!("kind changed") };
        let factor = random_factor(0.0, LOSS_SCALE, 0.5);
        approx(out.loss_percentage, DEFAULT_LOSS_PERCENTAGE * (1.0 + factor));
        assert!(out.loss_percentage > 0.0);
    }

    #[test]
    fn enrich_bandwidth_uses_rate() {
        let e = enricher(&[("rate", "10000")], 0.0);
        let msg = Message::Bandwidth(BandwidthMessage { envelope: envelope("GigabitEthernet0/0/0/1"), bandwidth: 1.0 });
        let Message::Bandwidth(out) = e.enrich(msg).unwrap() else { panic!("kind changed") };
        assert_eq!(out.bandwidth, 10_000.0);
    }

    #[test]
    fn loopback_is_dropped_before_enrichment() {
        let e = enricher(&[("rate", "10000")], 0.0);
        let msg = Message::Bandwidth(BandwidthMessage { envelope: envelope("Loopback0"), bandwidth: 1.0 });
        assert!(matches!(e.enrich(msg), Err(LinkerError::PatternMismatch(n)) if n == "Loopback0"));
    }

    #[test]
    fn bad_stored_value_and_unknown_kind_are_errors() {
        let e = enricher(&[("delay", "soon")], 0.0);
        let msg = Message::Delay(DelayMessage {
            envelope: envelope("GigabitEthernet0/0/0/1"),
            average: 1.0,
            maximum: 1.0,
            minimum: 1.0,
            variance: 0.0,
        });
        assert!(matches!(e.enrich(msg), Err(LinkerError::ValueConversion { .. })));
        assert!(matches!(
            e.enrich(Message::Unknown(envelope("GigabitEthernet0/0/0/1"))),
            Err(LinkerError::Decode(DecodeError::UnknownKind(_)))
        ));
    }
}
