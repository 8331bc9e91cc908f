pub mod api_key;
pub mod generation_request;
pub mod problem;
pub mod sentence;
pub mod verb;

pub use api_key::{ApiKey, Permission};
pub use generation_request::{EntityType, GenerationRequest, RequestStatus};
pub use problem::{GenerationTrace, Problem, ProblemType, SentenceTrace, Statement};
pub use sentence::{Negation, ObjectCategory, Sentence};
pub use verb::{Auxiliary, Conjugation, Tense, VerbClassification, Verb};

/// Opaque 128-bit identifier used for every entity in the system (spec §3).
pub type EntityId = uuid::Uuid;

/// UTC millisecond instant, stored and transmitted as an RFC3339 timestamp.
pub type Instant = chrono::DateTime<chrono::Utc>;
