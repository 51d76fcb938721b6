//! Tallyboard ingestion
//!
//! Everything between "the user picked some sources" and "there is an
//! aggregate to chart":
//!
//! ```text
//! SourceSlots ──► 1. upload local files (one batch)
//!             ──► 2. process external sheets (one at a time, slot order)
//!             ──► 3. fetch aggregate (current query parameters)
//!             ──► 4. view mode = dashboard
//! ```
//!
//! The remote side is reached through the traits in [`collaborators`];
//! [`http::HttpBackend`] implements them against the REST backend.

pub mod collaborators;
#[cfg(feature = "http")]
pub mod http;
pub mod pipeline;
pub mod sources;

pub use collaborators::{
    AggregateResult, AuthToken, CatalogCollaborator, FetchCollaborator, NoopCatalog, Outcome,
    SheetCollaborator, SheetProcessed, SheetRequest, UploadCollaborator, ViewMode, ViewModeSink,
};
pub use pipeline::{IngestionError, IngestionOutcome, IngestionPipeline};
pub use sources::{ExternalSheet, LocalFile, SlotError, SourceDescriptor, SourceSlots};
