//! In-memory step handlers for tests and the demo runner.

pub mod call_log;
pub mod create_record;
pub mod faults;
pub mod update_fields;

pub use call_log::{CallKind, CallLog, StepCall};
pub use create_record::{CreateRecordStep, CreatedRecord};
pub use faults::FaultSwitch;
pub use update_fields::{FieldUpdateReceipt, UpdateFieldsStep};
