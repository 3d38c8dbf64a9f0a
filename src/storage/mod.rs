pub mod disk_writer;
pub mod jsonl;

pub use disk_writer::{DiskWriter, FlushReport};
