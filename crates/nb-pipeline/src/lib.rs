//! Client pipeline for the image-editing agent services.
//!
//! A run resolves an input image, uploads it, opens an agent session, reads
//! the agent's streaming run until the first resolving event and downloads
//! the generated artifact. Every stage failure is terminal.
//!
//! # Usage
//!
//! ```no_run
//! use nb_pipeline::{ImageSource, Orchestrator, PipelineConfig, PipelineError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), PipelineError> {
//! let orchestrator = Orchestrator::http(PipelineConfig::from_env()?)?;
//! let report = orchestrator
//!     .run(&ImageSource::parse("./cat.jpg"), "give the cat a hat")
//!     .await?;
//!
//! println!("saved {}", report.saved_to.display());
//! # Ok(())
//! # }
//! ```

/// Endpoints, identities, timeouts and host rewriting.
pub mod config;
/// Error taxonomy and per-stage exit codes.
pub mod errors;
/// Decoded agent events and run outcomes.
pub mod event;
/// Artifact download and persistence.
pub mod fetch;
/// Input image resolution.
pub mod input;
/// Logging bootstrap.
pub mod observability;
/// Stage sequencing.
pub mod pipeline;
/// Line-by-line run stream consumption.
pub mod runner;
/// Service contracts shared by the stages.
pub mod services;
/// Agent runtime HTTP client.
pub mod session;
pub(crate) mod transport;
/// Upload/static-file service HTTP client.
pub mod upload;

pub use config::{HostRewrite, PipelineConfig};
pub use errors::{PipelineError, Stage};
pub use event::{AgentEvent, EventPart, Resolution, ResolvedOutcome};
pub use fetch::{ArtifactFetcher, FinalArtifact};
pub use input::{ImageSource, InputResolver};
pub use observability::{LogSettings, init_observability, init_observability_with};
pub use pipeline::{Orchestrator, PipelineReport};
pub use runner::{LineVerdict, SkipReason, StreamRunner, process_line};
pub use services::{AgentRuntime, ByteStream, ImageService, ImageUpload, RunRequest, Session, UploadedImage};
pub use session::HttpAgentRuntime;
pub use upload::HttpImageService;
