mod driver;
mod meter;

pub use driver::MeterDriver;
pub use meter::{format_mm_ss, MeterState, TickOutcome, UsageMeter, UsageSnapshot};
