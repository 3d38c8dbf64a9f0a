pub mod pipeline;
pub mod stop;

pub use pipeline::{connect_store, Pipeline};
pub use stop::StopSignal;
