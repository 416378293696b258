use linker_api::{
    BANDWIDTH, BandwidthMessage, DELAY_AVERAGE, DELAY_MAXIMUM, DELAY_MINIMUM, DELAY_VARIANCE,
    DecodeError, DelayMessage, ISIS, LossMessage, Message, PACKET_LOSS_PERCENTAGE,
    PERFORMANCE_MEASUREMENT, TelemetryEnvelope,
};

// ═══════════════════════════════════════════════════════════════
//  Decoder: raw record → typed messages
// ═══════════════════════════════════════════════════════════════

/// Разобрать одну запись брокера.
///
/// Для `isis` из одной записи может получиться два сообщения
/// (loss, затем bandwidth). Пустой результат не возвращается:
/// запись без известных метрик: `UnknownIsisMetric`.
pub fn decode_record(raw: &[u8]) -> Result<Vec<Message>, DecodeError> {
    let envelope: TelemetryEnvelope = serde_json::from_slice(raw)?;
    classify(envelope)
}

/// Типизировать уже разобранный конверт по `name` и набору полей.
pub fn classify(envelope: TelemetryEnvelope) -> Result<Vec<Message>, DecodeError> {
    match envelope.name.as_str() {
        PERFORMANCE_MEASUREMENT => decode_delay(envelope).map(|m| vec![Message::Delay(m)]),
        ISIS => decode_isis(envelope),
        _ => Err(DecodeError::UnknownKind(envelope.name)),
    }
}

fn decode_delay(envelope: TelemetryEnvelope) -> Result<DelayMessage, DecodeError> {
    let average = required(&envelope, DELAY_AVERAGE)?;
    let maximum = required(&envelope, DELAY_MAXIMUM)?;
    let minimum = required(&envelope, DELAY_MINIMUM)?;
    let variance = required(&envelope, DELAY_VARIANCE)?;
    Ok(DelayMessage { envelope, average, maximum, minimum, variance })
}

fn decode_isis(envelope: TelemetryEnvelope) -> Result<Vec<Message>, DecodeError> {
    let has_loss = envelope.has_field(PACKET_LOSS_PERCENTAGE);
    let has_bandwidth = envelope.has_field(BANDWIDTH);

    let mut messages = Vec::with_capacity(2);
    match (has_loss, has_bandwidth) {
        (false, false) => return Err(DecodeError::UnknownIsisMetric),
        (true, false) => {
            let loss_percentage = required(&envelope, PACKET_LOSS_PERCENTAGE)?;
            messages.push(Message::Loss(LossMessage { envelope, loss_percentage }));
        }
        (false, true) => {
            let bandwidth = required(&envelope, BANDWIDTH)?;
            messages.push(Message::Bandwidth(BandwidthMessage { envelope, bandwidth }));
        }
        (true, true) => {
            let loss_percentage = required(&envelope, PACKET_LOSS_PERCENTAGE)?;
            let bandwidth = required(&envelope, BANDWIDTH)?;
            messages.push(Message::Loss(LossMessage {
                envelope: envelope.clone(),
                loss_percentage,
            }));
            messages.push(Message::Bandwidth(BandwidthMessage { envelope, bandwidth }));
        }
    }
    Ok(messages)
}

fn required(envelope: &TelemetryEnvelope, key: &'static str) -> Result<f64, DecodeError> {
    envelope.number(key).ok_or(DecodeError::MissingField(key))
}
