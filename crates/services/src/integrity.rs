use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use exam_core::model::ExamSession;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

//
// ─── ENVIRONMENT ───────────────────────────────────────────────────────────────
//

/// Edge-triggered notification from the exam host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// Document visibility changed; `visible = false` means the tab was left.
    Visibility { visible: bool },
    /// Fullscreen state changed.
    Fullscreen { active: bool },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fullscreen request denied: {0}")]
pub struct FullscreenDenied(pub String);

/// Host capability the integrity monitor depends on.
#[async_trait]
pub trait SignalSource: Send {
    /// Next signal, or `None` once the environment has gone away.
    async fn next_signal(&mut self) -> Option<EnvironmentSignal>;

    /// Ask the host to enter fullscreen.
    ///
    /// # Errors
    ///
    /// Returns `FullscreenDenied` if the host refuses.
    fn request_fullscreen(&mut self) -> Result<(), FullscreenDenied>;

    /// Leave fullscreen once the attempt no longer needs it.
    fn release_fullscreen(&mut self);
}

/// Channel-backed `SignalSource`, paired with a `SignalEmitter`.
#[derive(Debug)]
pub struct ChannelSignalSource {
    rx: mpsc::UnboundedReceiver<EnvironmentSignal>,
    allow_fullscreen: bool,
    releases: Arc<AtomicUsize>,
}

/// Sending half of a `ChannelSignalSource`.
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    tx: mpsc::UnboundedSender<EnvironmentSignal>,
    releases: Arc<AtomicUsize>,
}

/// Create a connected emitter/source pair.
///
/// `allow_fullscreen` decides whether `request_fullscreen` succeeds.
#[must_use]
pub fn signal_channel(allow_fullscreen: bool) -> (SignalEmitter, ChannelSignalSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let releases = Arc::new(AtomicUsize::new(0));
    (
        SignalEmitter {
            tx,
            releases: Arc::clone(&releases),
        },
        ChannelSignalSource {
            rx,
            allow_fullscreen,
            releases,
        },
    )
}

impl SignalEmitter {
    /// Returns `false` if the source has been dropped.
    pub fn send(&self, signal: EnvironmentSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn hide(&self) -> bool {
        self.send(EnvironmentSignal::Visibility { visible: false })
    }

    pub fn show(&self) -> bool {
        self.send(EnvironmentSignal::Visibility { visible: true })
    }

    pub fn exit_fullscreen(&self) -> bool {
        self.send(EnvironmentSignal::Fullscreen { active: false })
    }

    pub fn enter_fullscreen(&self) -> bool {
        self.send(EnvironmentSignal::Fullscreen { active: true })
    }

    /// How many times the source was asked to leave fullscreen.
    #[must_use]
    pub fn fullscreen_releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSource for ChannelSignalSource {
    async fn next_signal(&mut self) -> Option<EnvironmentSignal> {
        self.rx.recv().await
    }

    fn request_fullscreen(&mut self) -> Result<(), FullscreenDenied> {
        if self.allow_fullscreen {
            Ok(())
        } else {
            Err(FullscreenDenied("host refused fullscreen".into()))
        }
    }

    fn release_fullscreen(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

//
// ─── MONITOR ───────────────────────────────────────────────────────────────────
//

/// Strike state derived from the session's violation count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityState {
    Armed,
    Warned,
    Tripped,
}

impl IntegrityState {
    #[must_use]
    pub fn from_count(count: u32, threshold: u32) -> Self {
        if count >= threshold {
            Self::Tripped
        } else if count > 0 {
            Self::Warned
        } else {
            Self::Armed
        }
    }
}

/// Outcome of a counted violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityEvent {
    /// Below threshold: show "count of threshold" and keep watching.
    Warning { count: u32, threshold: u32 },
    /// Threshold reached: the attempt must be submitted now.
    Tripped { count: u32 },
}

/// Turns visibility and fullscreen signals into violations on the session.
///
/// Both signal kinds feed one counter, and nothing ever resets it.
#[derive(Debug, Default)]
pub struct IntegrityMonitor {
    armed: bool,
    fullscreen_active: bool,
}

impl IntegrityMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing and make a best-effort fullscreen request.
    ///
    /// A denied request is logged; it is not a violation.
    pub fn arm(&mut self, source: &mut dyn SignalSource) {
        self.armed = true;
        match source.request_fullscreen() {
            Ok(()) => self.fullscreen_active = true,
            Err(err) => warn!(error = %err, "could not enter fullscreen"),
        }
        info!(fullscreen = self.fullscreen_active, "integrity monitor armed");
    }

    /// Stop observing. Safe to call any number of times.
    pub fn disarm(&mut self) {
        if self.armed {
            self.armed = false;
            debug!("integrity monitor disarmed");
        }
    }

    /// Hand fullscreen back to the host if this monitor still holds it.
    pub fn release(&mut self, source: &mut dyn SignalSource) {
        if std::mem::replace(&mut self.fullscreen_active, false) {
            source.release_fullscreen();
            debug!("fullscreen released");
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn state(&self, session: &ExamSession) -> IntegrityState {
        IntegrityState::from_count(
            session.violation_count(),
            session.settings().violation_threshold(),
        )
    }

    /// Feed one signal. Returns an event when it counted as a violation.
    pub fn observe(
        &mut self,
        signal: EnvironmentSignal,
        session: &mut ExamSession,
    ) -> Option<IntegrityEvent> {
        if !self.armed {
            debug!(?signal, "signal ignored while disarmed");
            return None;
        }

        let violation = match signal {
            EnvironmentSignal::Visibility { visible } => !visible,
            EnvironmentSignal::Fullscreen { active: true } => {
                self.fullscreen_active = true;
                false
            }
            // Only leaving a fullscreen that was actually held counts.
            EnvironmentSignal::Fullscreen { active: false } => {
                std::mem::replace(&mut self.fullscreen_active, false)
            }
        };
        if !violation {
            return None;
        }

        let count = session.record_violation()?;
        let threshold = session.settings().violation_threshold();
        if count >= threshold {
            warn!(count, threshold, ?signal, "integrity threshold reached");
            Some(IntegrityEvent::Tripped { count })
        } else {
            warn!(count, threshold, ?signal, "integrity violation");
            Some(IntegrityEvent::Warning { count, threshold })
        }
    }
}
