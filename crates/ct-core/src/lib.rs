//! Core engine for the cycle tracker.
//!
//! This crate contains the record model and the computation pipeline:
//! - Classification: typed events from raw store records
//! - Pairing and windows: matching Starts to Ends, incremental recomputation
//! - Statistics: cycle and period lengths, averages, predictions
//! - Quality: duplicate, ordering, and provenance flags
//!
//! Storage is reached only through the [`RecordStore`] and [`StateRepository`] traits.

pub mod config;
pub mod debounce;
pub mod event;
pub mod event_kind;
pub mod pairing;
pub mod pipeline;
pub mod plan;
pub mod provenance;
pub mod quality;
pub mod record;
pub mod stats;
pub mod store;
pub mod title;
mod types;
pub mod window;

#[cfg(test)]
mod test_support;

pub use config::{AveragingStrategy, ConfigError, EngineConfig, PropertyNames};
pub use debounce::DebounceDecision;
pub use event::Event;
pub use event_kind::{EventKind, KindLabels, UnknownEventKind};
pub use pipeline::{PipelineError, RunOptions, RunReport, run_pipeline};
pub use record::{DateValue, Fields, Filter, PropertyError, PropertyValue, Record};
pub use stats::{CycleStats, Prediction};
pub use store::{
    CalculationState, RecordStateRepository, RecordStore, StateRepository, StoreError,
};
pub use types::{Author, RecordId, ValidationError};
pub use window::Window;
