// src/background/mod.rs
// Out-of-band work spawned by turns

mod report_worker;

pub use report_worker::{ReportQueue, ReportWorker, recover_pending};
