use std::future::Future;
use std::pin::Pin;

mod error;
mod telemetry;

pub use error::{BrokerError, DecodeError, ErrorKind, LinkerError};
pub use telemetry::*;

// ════════════════════════════════════════════════════════════════
//  Impairment store
// ════════════════════════════════════════════════════════════════

/// Read-only доступ к хранилищу конфигурации (key/value по dotted path).
///
/// Отсутствующий ключ: пустая строка, отдельной ошибки "not found" нет.
/// Реализации должны допускать конкурентное чтение; согласованность:
/// best effort (устаревшее значение допустимо).
pub trait ConfigStore: Send + Sync {
    fn get_value(&self, key: &str) -> String;
}

// ════════════════════════════════════════════════════════════════
//  Broker client
// ════════════════════════════════════════════════════════════════

/// Входная сторона брокера: одна тема, одна партиция, чтение с хвоста.
///
/// `recv` должен быть cancel-safe: pipeline гоняет его в `select!`
/// против сигнала остановки.
pub trait RecordSource: Send {
    /// Следующая сырая запись. `None`: источник закрыт.
    #[allow(clippy::type_complexity)]
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Vec<u8>, BrokerError>>> + Send + '_>>;

    /// Освободить ресурсы. Вызывается после выхода intake-стадии.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Выходная сторона брокера: одна тема, без ключа партиционирования.
pub trait RecordSink: Send {
    /// Отправить одну закодированную запись.
    fn send(&mut self, record: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;

    /// Flush + закрыть соединение. Вызывается после выхода publication-стадии.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}
