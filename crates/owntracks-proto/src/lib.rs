//! OwnTracks JSON messages, limited to what the Reitti ingest endpoint
//! (`/api/v1/ingest/owntracks`) understands.
//!
//! See: <https://owntracks.org/booklet/tech/json/>

pub mod location;
pub mod message;
pub mod tracker_id;

#[doc(no_inline)]
pub use location::{Location, LocationInvalidity};
#[doc(no_inline)]
pub use message::Message;
#[doc(no_inline)]
pub use tracker_id::{TrackerId, TrackerIdInvalidity};
