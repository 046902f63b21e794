pub mod bolt;
pub mod sequencer;
