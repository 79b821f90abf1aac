// Campuslog core
//
// Pure building blocks of the event-log pipeline:
// - Event / Severity: what call sites record
// - EncodedRecord: the JSON-line form stored in app_<YYYY-MM-DD>.log files
// - classifier: heuristic mapping onto the canonical action/status taxonomy
// - extract + log_record: mapping an encoded line onto an error-index row
//
// Key design decisions:
// - No I/O and no database types here; campuslog-durable owns both
// - One mapping path for live enrichment and batch import
// - Timestamps are local wall-clock NaiveDateTime, millisecond precision

pub mod classifier;
pub mod clock;
pub mod error;
pub mod event;
pub mod extract;
pub mod log_record;
pub mod partition;
pub mod record;

pub use classifier::{classify, classify_with_level, Classification, LogStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, Result};
pub use event::{actions, Event, EventBuilder, Severity};
pub use log_record::{DedupKey, LogRecord, NewLogRecord, RecordOrigin};
pub use partition::{partition_date, partition_file_name};
pub use record::{encode_line, EncodedRecord};
