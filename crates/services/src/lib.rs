#![forbid(unsafe_code)]

pub mod controller;
pub mod error;
pub mod integrity;
pub mod submission;
pub mod timer;

pub use exam_core::Clock;

pub use controller::{ExamCommand, ExamController, ExamNotice};
pub use error::{ExamError, SubmissionError};
pub use integrity::{
    ChannelSignalSource, EnvironmentSignal, FullscreenDenied, IntegrityEvent, IntegrityMonitor,
    IntegrityState, SignalEmitter, SignalSource, signal_channel,
};
pub use submission::{
    Admission, Delivery, SubmissionCoordinator, SubmissionReceipt, SubmitOutcome,
};
pub use timer::{CountdownTimer, TimerEvent};
