//! Domain value objects.
//!
//! Value objects are immutable objects that represent concepts in the domain
//! and are defined by their attributes rather than identity.

mod location;
mod probe;
mod retry_policy;
mod source_query;
mod stream_handle;

pub use location::{Location, UNSPECIFIED};
pub use probe::{ProbeOutcome, ProbeResult};
pub use retry_policy::RetryPolicy;
pub use source_query::{SourceQuery, youtube_video_id};
pub use stream_handle::{QualityTier, StreamHandle};
