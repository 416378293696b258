use std::fmt::Write;

use linker_api::{
    BANDWIDTH, DELAY_AVERAGE, DELAY_MAXIMUM, DELAY_MINIMUM, DELAY_VARIANCE, LinkerError, Message,
    MessageTags, PACKET_LOSS_PERCENTAGE, TelemetryEnvelope,
};

// ═══════════════════════════════════════════════════════════════
//  Line protocol encoder
// ═══════════════════════════════════════════════════════════════

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Сериализовать сообщение в одну строку line protocol (с `\n`).
///
/// `<name>,host=..,interface_name=..[,node=..],path=..,source=..,subscription=.. <fields> <ts_ns>`
pub fn encode_line(message: &Message) -> Result<String, LinkerError> {
    let fields: Vec<(&str, f64)> = match message {
        Message::Delay(m) => vec![
            (DELAY_AVERAGE, m.average),
            (DELAY_MAXIMUM, m.maximum),
            (DELAY_MINIMUM, m.minimum),
            (DELAY_VARIANCE, m.variance),
        ],
        Message::Loss(m) => vec![(PACKET_LOSS_PERCENTAGE, m.loss_percentage)],
        Message::Bandwidth(m) => vec![(BANDWIDTH, m.bandwidth)],
        Message::Unknown(env) => {
            return Err(LinkerError::Encode(format!("unknown message kind '{}'", env.name)));
        }
    };
    encode_envelope(message.envelope(), &fields)
}

fn encode_envelope(env: &TelemetryEnvelope, fields: &[(&str, f64)]) -> Result<String, LinkerError> {
    if env.name.is_empty() {
        return Err(LinkerError::Encode("empty measurement name".into()));
    }
    let timestamp_ns = env
        .timestamp
        .checked_mul(NANOS_PER_SECOND)
        .ok_or_else(|| LinkerError::Encode(format!("timestamp {} out of range", env.timestamp)))?;

    let mut line = String::with_capacity(256);
    push_escaped(&mut line, &env.name, &[',', ' '])?;

    for (key, value) in ordered_tags(&env.tags) {
        if value.is_empty() {
            if key == "node" {
                continue;
            }
            return Err(LinkerError::Encode(format!("tag '{key}' is empty")));
        }
        line.push(',');
        push_escaped(&mut line, key, &[',', '=', ' '])?;
        line.push('=');
        push_escaped(&mut line, value, &[',', '=', ' '])?;
    }

    for (i, (key, value)) in fields.iter().enumerate() {
        if !value.is_finite() {
            return Err(LinkerError::Encode(format!("field '{key}' is not finite: {value}")));
        }
        line.push(if i == 0 { ' ' } else { ',' });
        push_escaped(&mut line, key, &[',', '=', ' '])?;
        // writing to String never fails
        let _ = write!(line, "={value}");
    }

    let _ = writeln!(line, " {timestamp_ns}");
    Ok(line)
}

/// Фиксированный порядок тегов на выходе.
fn ordered_tags(tags: &MessageTags) -> [(&'static str, &str); 6] {
    [
        ("host", tags.host.as_str()),
        ("interface_name", tags.interface_name.as_str()),
        ("node", tags.node.as_str()),
        ("path", tags.path.as_str()),
        ("source", tags.source.as_str()),
        ("subscription", tags.subscription.as_str()),
    ]
}

fn push_escaped(out: &mut String, text: &str, special: &[char]) -> Result<(), LinkerError> {
    for c in text.chars() {
        if c == '\n' || c == '\r' {
            return Err(LinkerError::Encode(format!("line break in '{}'", text.escape_debug())));
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    Ok(())
}
