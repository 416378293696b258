pub mod config;
pub mod error;
pub mod decoder;
pub mod encoder;
pub mod enricher;
pub mod handoff;
pub mod impairments;
pub mod memory;
mod runner;

pub use config::PipelineConfig;
pub use decoder::decode_record;
pub use encoder::encode_line;
pub use enricher::{Enricher, FactorSource, FixedFactor, ThreadRngFactor};
pub use error::PipelineError;
pub use impairments::{ImpairmentLookup, canonicalize_interface, impairment_prefix};
pub use memory::{MemorySink, MemorySource, memory_sink, memory_source};
pub use runner::{Pipeline, PipelineStats, Stage, StageStatus};
