//! # trellis-sync
//!
//! Reconciles a workspace with the build model exported by the build tool.
//!
//! Call [`pipeline::run`] with a [`SyncScope`] to fetch the relevant builds and
//! apply them, or drive [`synchronize`] directly with a [`BuildView`] and a
//! [`NewProjectPolicy`].

pub mod engine;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod uncouple;
pub mod view;

pub use engine::{synchronize, synchronize_project, TEMPORARY_SUFFIX};
pub use error::{FetchError, SyncError};
pub use fetch::{FetchOutcome, FetchStrategy, FileModelFetcher, ModelFetcher};
pub use pipeline::{known_builds, PipelineOutcome, SyncScope};
pub use policy::{
    with_working_sets, BuildScoped, Delegating, ImportAndMerge, ImportAndOverwrite,
    NewProjectPolicy, SharedPolicy, SkipNew,
};
pub use report::{ModuleFailure, Mutation, SyncReport};
pub use uncouple::uncouple;
pub use view::{flatten, BuildModel, BuildView};
