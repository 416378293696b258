/// Категория ошибки обработки сообщения. Определяет, насколько громко
/// pipeline сообщает о потере записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Ожидаемый пропуск (чужой вид телеметрии, интерфейс вне схемы имён).
    Skip,
    /// Битые данные: входная запись, сохранённое значение, сериализация.
    Format,
    /// Отказ брокера.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Skip => f.write_str("skip"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Io => f.write_str("io"),
        }
    }
}

/// Ошибки разбора входной записи. Запись отбрасывается, повтора нет.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed telemetry record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("field '{0}' is missing or not numeric")]
    MissingField(&'static str),

    #[error("isis record carries neither packet loss nor bandwidth")]
    UnknownIsisMetric,

    #[error("unknown telemetry name '{0}'")]
    UnknownKind(String),
}

/// Ошибки брокерного клиента (приём / отправка записей).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker closed")]
    Closed,

    #[error("{0}")]
    Rejected(String),
}

/// Единая ошибка обработки одного сообщения. Ни один вариант не фатален
/// для pipeline: сообщение логируется и теряется.
#[derive(Debug, thiserror::Error)]
pub enum LinkerError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("interface name '{0}' does not match expected pattern")]
    PatternMismatch(String),

    #[error("cannot convert '{value}' of '{key}' to a number")]
    ValueConversion { key: String, value: String },

    #[error("encode: {0}")]
    Encode(String),

    #[error("publish: {0}")]
    Publish(#[from] BrokerError),
}

impl LinkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkerError::Decode(DecodeError::UnknownKind(_) | DecodeError::UnknownIsisMetric) => {
                ErrorKind::Skip
            }
            LinkerError::Decode(_) => ErrorKind::Format,
            LinkerError::PatternMismatch(_) => ErrorKind::Skip,
            LinkerError::ValueConversion { .. } | LinkerError::Encode(_) => ErrorKind::Format,
            LinkerError::Publish(_) => ErrorKind::Io,
        }
    }
}
