pub mod field;
pub mod framer;
pub mod message;
pub mod sentence;

pub use framer::{checksum, frame_sentence, split_frame, validate, with_checksum, SentenceFramer};
pub use message::{DepthKind, EnvTelemetry, HeadingKind, NavMessage};
pub use sentence::Sentence;
