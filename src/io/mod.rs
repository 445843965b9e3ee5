//! IO modules - external system interfaces
//!
//! - `replay` - JSONL batch input (file or stdin)
//! - `seed` - Startup population of fences and devices
//! - `egress` - Transition output to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress;
pub mod prometheus;
pub mod replay;
pub mod seed;

pub use egress::Egress;
pub use replay::{run_replay, BatchRecord, ReplayStats};
pub use seed::{load_seed, SeedFile, SeedSummary};
