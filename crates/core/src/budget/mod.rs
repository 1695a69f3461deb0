//! Disk budget governor.
//!
//! Every stage that writes to local disk asks the governor for admission
//! before starting. Admission is full-or-nothing: an operation either
//! gets its whole estimated allowance reserved or is deferred. The
//! governor is the single point of serialized admission decisions; no
//! other component tracks disk usage.

mod config;
mod governor;

pub use config::DiskBudgetConfig;
pub use governor::{Admission, DiskBudget};
