// Post-dispatch pipeline
//
// Composes the daily commit post, uploads the rendered image, submits the post
// and records the job outcome.

pub mod bsky_client;
pub mod composer;
pub mod dispatch;
pub mod facets;
pub mod outcome;

pub use bsky_client::{AttachmentRef, BskyClient, PostRecord, PostRef, Session, SocialClient};
pub use composer::{compose_message, CommitCount, ComposedMessage};
pub use dispatch::{build_post_record, Dispatcher, PostJob};
pub use facets::{detect_facets, Facet, FacetFeature};
pub use outcome::{record_outcome, JobState, LogSink, OutcomeStore, PostOutcome};
