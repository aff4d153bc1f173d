//! Pipeline orchestration, declarative specs, and observers.
//!
//! ## Submodules
//!
//! - [`runner`]: [`MapperPipeline`] and its fit/transform entry points
//! - [`observer`]: stage timing and debug hooks
//! - [`spec`] / [`spec_builder`]: JSON pipeline specs and the builder that runs them
//! - [`validation`]: rule-based checks over a spec
//! - [`errors`] / [`error_code`]: located spec diagnostics and stable codes

pub mod error_code;
pub mod errors;
pub mod observer;
pub mod runner;
pub mod spec;
pub mod spec_builder;
pub mod validation;

pub use observer::{MapperObserver, NoopObserver, StageReport, StageTimingObserver};
pub use runner::{DynMapperPipeline, MapperPipeline, StandardMapperPipeline};
pub use spec::MapperSpec;
pub use spec_builder::SpecPipelineBuilder;
