use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use pipeline::PipelineConfig;
use transport_kafka::{KafkaSinkConfig, KafkaSourceConfig};
use transport_tcp::{TcpSinkConfig, TcpSourceConfig};

use crate::error::ServerError;

#[derive(Parser)]
#[command(
    name = "clab-telemetry-linker",
    about = "Обогащение телеметрии импэрментами containerlab-интерфейсов"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить pipeline: приём телеметрии, обогащение, публикация
    Start(StartArgs),
    /// Задать импэрменты интерфейса
    Set(SetArgs),
    /// Показать сохранённые импэрменты узла
    Show(ShowArgs),
    /// Удалить импэрменты интерфейса
    Delete(DeleteArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Путь к store-файлу импэрментов (default: ~/.clab-telemetry-linker/config.toml)
    #[arg(long, env = "LINKER_STORE")]
    pub store: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct StartArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "linker.toml", env = "LINKER_CONFIG")]
    pub config: String,

    /// Kafka-брокеры, e.g. localhost:9092 (через запятую или повтором)
    #[arg(short, long, value_delimiter = ',')]
    pub broker: Vec<String>,

    /// Kafka-тема с входной телеметрией
    #[arg(short, long)]
    pub receiver_topic: Option<String>,

    /// Kafka-тема для обогащённых записей
    #[arg(short, long)]
    pub publisher_topic: Option<String>,

    /// TCP: адрес для приёма телеметрии (host:port)
    #[arg(long)]
    pub listen: Option<String>,

    /// TCP: адрес collector'а для обогащённых записей (host:port)
    #[arg(long)]
    pub connect: Option<String>,

    /// Период опроса store-файла в мс (0 = не следить)
    #[arg(long)]
    pub watch_interval_ms: Option<u64>,

    /// Сколько ждать каждую стадию при остановке, мс
    #[arg(long)]
    pub stop_timeout_ms: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone, Debug)]
pub struct SetArgs {
    /// Узел (без префикса лаборатории), e.g. XR-1
    #[arg(short, long)]
    pub node: String,

    /// Интерфейс, e.g. Gi0-0-0-1 или GigabitEthernet0/0/0/1
    #[arg(short, long)]
    pub interface: String,

    /// Исходящая задержка, мс
    #[arg(short, long, default_value_t = 0)]
    pub delay: u64,

    /// Вариация задержки (jitter), мс
    #[arg(short, long, default_value_t = 0)]
    pub jitter: u64,

    /// Потери пакетов, %
    #[arg(short, long, default_value_t = 0.0)]
    pub loss: f64,

    /// Скорость линка, kbit/s
    #[arg(short, long, default_value_t = 0)]
    pub rate: u64,

    /// Выполнить `containerlab tools netem`, а не только напечатать
    #[arg(long)]
    pub apply: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone, Debug)]
pub struct ShowArgs {
    #[arg(short, long)]
    pub node: String,

    /// Только этот интерфейс
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Дополнительно выполнить `containerlab tools netem show`
    #[arg(long)]
    pub apply: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone, Debug)]
pub struct DeleteArgs {
    #[arg(short, long)]
    pub node: String,

    #[arg(short, long)]
    pub interface: String,

    /// Выполнить сброс через `containerlab tools netem`
    #[arg(long)]
    pub apply: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl StoreArgs {
    /// Явный путь или `$HOME/.clab-telemetry-linker/config.toml`.
    pub fn resolve(&self, from_file: Option<&str>) -> Result<PathBuf, ServerError> {
        if let Some(path) = self.store.as_deref().or(from_file) {
            return Ok(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME").ok_or_else(|| ServerError::Config {
            context: "store",
            detail: "HOME is not set, pass --store".into(),
        })?;
        Ok(Path::new(&home).join(".clab-telemetry-linker").join("config.toml"))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    pub kafka: KafkaSection,
    pub input: InputSection,
    pub output: OutputSection,
    pub store: StoreSection,
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Kafka,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KafkaSection {
    pub brokers: Vec<String>,
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputSection {
    pub transport: Option<TransportKind>,
    pub topic: Option<String>,
    pub listen: Option<String>,
    pub max_line_length: Option<usize>,
    pub buffer: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub transport: Option<TransportKind>,
    pub topic: Option<String>,
    pub connect: Option<String>,
    pub buffer: Option<usize>,
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: Option<String>,
    pub watch_interval_ms: Option<u64>,
}

impl LinkerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Откуда `start` читает телеметрию.
#[derive(Debug)]
pub enum InputTransport {
    Tcp(TcpSourceConfig),
    Kafka(KafkaSourceConfig),
}

/// Куда `start` публикует обогащённые записи.
#[derive(Debug)]
pub enum OutputTransport {
    Tcp(TcpSinkConfig),
    Kafka(KafkaSinkConfig),
}

/// Итоговая конфигурация `start`: config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub input: InputTransport,
    pub output: OutputTransport,
    pub store_path: PathBuf,
    pub watch_interval_ms: u64,
    pub pipeline: PipelineConfig,
}

/// Тема в CLI: kafka; адрес в CLI: tcp; иначе `transport` из файла;
/// без него: kafka, если в файле задана тема.
fn select_transport(
    cli_topic: bool,
    cli_address: bool,
    file: Option<TransportKind>,
    file_topic: bool,
) -> TransportKind {
    if cli_topic {
        TransportKind::Kafka
    } else if cli_address {
        TransportKind::Tcp
    } else {
        file.unwrap_or(if file_topic { TransportKind::Kafka } else { TransportKind::Tcp })
    }
}

impl Effective {
    pub fn new(args: &StartArgs) -> Result<Self, ServerError> {
        let cfg = match LinkerConfig::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                LinkerConfig::default()
            }
        };

        let brokers = if args.broker.is_empty() { cfg.kafka.brokers.clone() } else { args.broker.clone() };
        let connect_timeout_ms = cfg.kafka.connect_timeout_ms;
        let need_brokers = || -> Result<Vec<String>, ServerError> {
            if brokers.is_empty() {
                return Err(ServerError::Config {
                    context: "kafka",
                    detail: "no brokers (--broker or [kafka] brokers)".into(),
                });
            }
            Ok(brokers.clone())
        };

        let input = match select_transport(
            args.receiver_topic.is_some(),
            args.listen.is_some(),
            cfg.input.transport,
            cfg.input.topic.is_some(),
        ) {
            TransportKind::Kafka => {
                let topic = args.receiver_topic.clone().or(cfg.input.topic).ok_or(ServerError::Config {
                    context: "input",
                    detail: "no receiver topic (--receiver-topic or [input] topic)".into(),
                })?;
                let mut kafka = KafkaSourceConfig::new(need_brokers()?, topic);
                if let Some(ms) = connect_timeout_ms {
                    kafka.connect_timeout_ms = ms;
                }
                if let Some(buffer) = cfg.input.buffer {
                    kafka.buffer = buffer;
                }
                InputTransport::Kafka(kafka)
            }
            TransportKind::Tcp => {
                let listen = args.listen.clone().or(cfg.input.listen).ok_or(ServerError::Config {
                    context: "input",
                    detail: "no input (--receiver-topic, --listen or [input])".into(),
                })?;
                let mut tcp = TcpSourceConfig::new(listen);
                if let Some(max) = cfg.input.max_line_length {
                    tcp.max_line_length = max;
                }
                if let Some(buffer) = cfg.input.buffer {
                    tcp.buffer = buffer;
                }
                InputTransport::Tcp(tcp)
            }
        };

        let output = match select_transport(
            args.publisher_topic.is_some(),
            args.connect.is_some(),
            cfg.output.transport,
            cfg.output.topic.is_some(),
        ) {
            TransportKind::Kafka => {
                let topic = args.publisher_topic.clone().or(cfg.output.topic).ok_or(ServerError::Config {
                    context: "output",
                    detail: "no publisher topic (--publisher-topic or [output] topic)".into(),
                })?;
                let mut kafka = KafkaSinkConfig::new(need_brokers()?, topic);
                if let Some(ms) = connect_timeout_ms {
                    kafka.connect_timeout_ms = ms;
                }
                if let Some(buffer) = cfg.output.buffer {
                    kafka.buffer = buffer;
                }
                if let Some(ms) = cfg.output.close_timeout_ms {
                    kafka.close_timeout_ms = ms;
                }
                OutputTransport::Kafka(kafka)
            }
            TransportKind::Tcp => {
                let connect = args.connect.clone().or(cfg.output.connect).ok_or(ServerError::Config {
                    context: "output",
                    detail: "no output (--publisher-topic, --connect or [output])".into(),
                })?;
                let mut tcp = TcpSinkConfig::new(connect);
                if let Some(buffer) = cfg.output.buffer {
                    tcp.buffer = buffer;
                }
                if let Some(ms) = cfg.output.close_timeout_ms {
                    tcp.close_timeout_ms = ms;
                }
                OutputTransport::Tcp(tcp)
            }
        };

        let mut pipeline = cfg.pipeline.unwrap_or_default();
        if let Some(ms) = args.stop_timeout_ms {
            pipeline.stop_timeout_ms = ms;
        }

        Ok(Self {
            input,
            output,
            store_path: args.store.resolve(cfg.store.path.as_deref())?,
            watch_interval_ms: args.watch_interval_ms.or(cfg.store.watch_interval_ms).unwrap_or(1000),
            pipeline,
        })
    }
}
