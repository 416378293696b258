use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
//  Sensor paths & envelope names
// ═══════════════════════════════════════════════════════════════

/// `name` конверта с метриками задержки (performance measurement).
pub const PERFORMANCE_MEASUREMENT: &str = "performance-measurement";
/// `name` конверта с метриками ISIS (loss / bandwidth).
pub const ISIS: &str = "isis";

pub const DELAY_AVERAGE: &str =
    "delay_measurement_session/last_advertisement_information/advertised_values/average";
pub const DELAY_MAXIMUM: &str =
    "delay_measurement_session/last_advertisement_information/advertised_values/maximum";
pub const DELAY_MINIMUM: &str =
    "delay_measurement_session/last_advertisement_information/advertised_values/minimum";
pub const DELAY_VARIANCE: &str =
    "delay_measurement_session/last_advertisement_information/advertised_values/variance";
pub const PACKET_LOSS_PERCENTAGE: &str = "interface_status_and_data/enabled/packet_loss_percentage";
pub const BANDWIDTH: &str = "interface_status_and_data/enabled/bandwidth";

// ═══════════════════════════════════════════════════════════════
//  Envelope
// ═══════════════════════════════════════════════════════════════

/// Теги записи телеметрии. `node` присутствует только у части сообщений.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTags {
    pub host: String,
    pub interface_name: String,
    pub node: String,
    pub path: String,
    pub source: String,
    pub subscription: String,
}

/// Обобщённая запись телеметрии до типизации по виду метрики.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryEnvelope {
    /// Значения сенсоров по полному пути (e.g. `interface_status_and_data/enabled/bandwidth`).
    pub fields: HashMap<String, serde_json::Value>,
    /// Дискриминатор: "performance-measurement", "isis", ...
    pub name: String,
    pub tags: MessageTags,
    /// Unix epoch, секунды.
    pub timestamp: i64,
}

impl TelemetryEnvelope {
    /// Поле присутствует и не равно `null`.
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| !v.is_null())
    }

    /// Числовое значение поля; `None` если поля нет или оно не число.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(serde_json::Value::as_f64)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Typed messages
// ═══════════════════════════════════════════════════════════════

/// Статистика односторонней задержки, микросекунды.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayMessage {
    pub envelope: TelemetryEnvelope,
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
    pub variance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossMessage {
    pub envelope: TelemetryEnvelope,
    /// Шкала 0–100, не ограничивается.
    pub loss_percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthMessage {
    pub envelope: TelemetryEnvelope,
    /// kbit/s.
    pub bandwidth: f64,
}

/// Закрытый набор видов сообщений, проходящих через pipeline.
///
/// `Unknown` существует только чтобы downstream-стадии могли явно
/// отвергнуть неклассифицированный конверт.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Delay(DelayMessage),
    Loss(LossMessage),
    Bandwidth(BandwidthMessage),
    Unknown(TelemetryEnvelope),
}

impl Message {
    pub fn envelope(&self) -> &TelemetryEnvelope {
        match self {
            Message::Delay(m) => &m.envelope,
            Message::Loss(m) => &m.envelope,
            Message::Bandwidth(m) => &m.envelope,
            Message::Unknown(env) => env,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Delay(_) => MessageKind::Delay,
            Message::Loss(_) => MessageKind::Loss,
            Message::Bandwidth(_) => MessageKind::Bandwidth,
            Message::Unknown(_) => MessageKind::Unknown,
        }
    }

    pub fn tags(&self) -> &MessageTags {
        &self.envelope().tags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Delay,
    Loss,
    Bandwidth,
    Unknown,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Delay => f.write_str("delay"),
            MessageKind::Loss => f.write_str("loss"),
            MessageKind::Bandwidth => f.write_str("bandwidth"),
            MessageKind::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_deserializes_snake_case_tags() {
        let raw = r#"{
            "fields": {"interface_status_and_data/enabled/bandwidth": 1000000},
            "name": "isis",
            "tags": {
                "host": "telegraf",
                "interface_name": "GigabitEthernet0/0/0/1",
                "path": "Cisco-IOS-XR-clns-isis-oper:isis/instances/instance/interfaces/interface",
                "source": "XR-1",
                "subscription": "hawk-metrics"
            },
            "timestamp": 1704728135
        }"#;
        let env: TelemetryEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.name, ISIS);
        assert_eq!(env.tags.interface_name, "GigabitEthernet0/0/0/1");
        assert_eq!(env.tags.node, "");
        assert_eq!(env.timestamp, 1704728135);
        assert_eq!(env.number(BANDWIDTH), Some(1_000_000.0));
        assert!(env.has_field(BANDWIDTH));
        assert!(!env.has_field(PACKET_LOSS_PERCENTAGE));
    }

    #[test]
    fn null_field_is_not_present() {
        let env: TelemetryEnvelope =
            serde_json::from_str(r#"{"fields": {"a": null, "b": "x"}}"#).unwrap();
        assert!(!env.has_field("a"));
        assert!(env.has_field("b"));
        assert_eq!(env.number("b"), None);
    }

    #[test]
    fn message_exposes_envelope_and_kind() {
        let env = TelemetryEnvelope { name: ISIS.into(), ..Default::default() };
        let msg = Message::Loss(LossMessage { envelope: env.clone(), loss_percentage: 1.0 });
        assert_eq!(msg.kind(), MessageKind::Loss);
        assert_eq!(msg.envelope(), &env);
        assert_eq!(Message::Unknown(env).kind().to_string(), "unknown");
    }
}
