pub mod alerts;
pub mod artifacts;
pub mod database;
pub mod inventory;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod store;

pub use alerts::{Alert, AlertSink, TracingAlertSink};
pub use artifacts::{ArtifactRenderer, DisabledRenderer, HttpArtifactRenderer};
pub use database::Database;
pub use inventory::{CogsFigures, HttpInventoryBridge, InventoryBridge, NoInventory};
pub use memory::{InMemoryStore, RecordingAlertSink};
pub use metrics::{get_metrics, init_metrics};
pub use queue::{QueuedTask, TaskQueue, TaskState, FISCAL_TRANSMIT_TASK};
pub use store::{FiscalStore, LedgerSource, ProfileStore, ReportStore, TransmissionUpdate};
