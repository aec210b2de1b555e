//! Scan engine: quota/dedup bookkeeping, the per-candidate evaluation
//! pipeline, and the wave-driven scan loop.

pub mod ledger;
pub mod pipeline;
pub mod scanner;

pub use ledger::{DedupCache, QuotaLedger};
pub use pipeline::{EvalOutcome, Pipeline};
pub use scanner::Scanner;
