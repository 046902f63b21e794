pub mod position;
pub mod region;
pub mod time;
pub mod timer;
