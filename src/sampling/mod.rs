pub mod clock;
pub mod sampler;

pub use clock::{run_minute_clock, run_minute_clock_with, TimeSource, WallClock};
pub use sampler::{MinuteSampler, SampleReport, Selection, SkipReason};
