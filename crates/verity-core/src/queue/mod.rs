//! Queue module: task records, the compaction pass, the admission policy
//! and the scheduler that ties them together.

pub mod admission;
pub mod compaction;
mod record;
mod scheduler;

pub use admission::{Admission, Denial};
pub use compaction::{Compaction, compact};
pub use record::TaskRecord;
pub use scheduler::{Scheduler, SchedulerPorts};
