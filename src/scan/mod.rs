pub mod recorder;

pub use recorder::{DedupPolicy, ScanRecorder};
