pub mod sequencer;
pub mod waitlist;

pub use sequencer::{Sequencer, SequencerConfig, SequencerError, SequencerStats};
pub use waitlist::Waitlist;
