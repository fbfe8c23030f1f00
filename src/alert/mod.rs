pub mod engine;
pub mod rules;
pub mod sink;

pub use engine::{dispatch, merge_rejected, report_alerts, AlertEvent};
pub use rules::{AlertEventKind, AlertRules};
pub use sink::{AlertSink, LogSink, StdoutSink, WebhookSink};
