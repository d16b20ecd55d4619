//! Ports - 外部との境界
//!
//! The scheduler and the supervisor only talk to the outside world through
//! these traits. Production implementations live in `impls`; tests swap in
//! recording fakes.
//!
//! - **Clock / IdGenerator**: time and task ids
//! - **CommandChannel**: verify / stop requests to the backend
//! - **BackendStatus**: readiness as seen by the scheduler
//! - **ProcessLauncher / BackendClient**: the nailgun server process and its client
//! - **EventSink**: status notifications for the editor

pub mod backend_client;
pub mod clock;
pub mod command_channel;
pub mod event_sink;
pub mod id_generator;
pub mod process;

pub use self::backend_client::{BackendClient, RuntimeCheck};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::command_channel::{BackendStatus, CommandChannel};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::process::{CommandSpec, ProcessEvent, ProcessLauncher, SpawnedProcess};
