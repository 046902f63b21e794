pub mod handler;
pub mod library;
pub mod pulse_scaling;
pub mod spell;
