pub mod pulsing;
pub mod range_monitor;
pub mod record;
