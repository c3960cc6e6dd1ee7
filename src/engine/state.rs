//! Recognition state machine
//!
//! `Session` holds everything the engine mutates: activity state, consensus
//! window, region of interest and in-flight count. The engine keeps exactly
//! one of these behind one mutex.

use serde::{Deserialize, Serialize};

use crate::analysis::ConsensusQueue;
use crate::error::PipelineError;
use crate::vision::Rect;

/// Externally visible engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Frames are received but not recognised
    Inactive,
    /// Recognising, waiting for the window to settle
    Waiting,
    /// Window just settled
    ///
    /// Internal and transient: entered and left inside one completion while the
    /// session lock is held, so `state()` never returns it. A settle is
    /// reported through [`Delivery::Settled`] instead.
    Settled,
}

/// What happens after a value has been reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Keep recognising and report again on the next settled window
    #[default]
    KeepRunning,
    /// Deactivate after the first reported value
    StopAfterFirst,
}

/// Why a frame was not submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Recognition is deactivated
    Inactive,
    /// The in-flight limit is reached
    Busy,
}

/// Result of handing a frame to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Frame was prepared and sent to the OCR engine
    Submitted,
    /// Frame was ignored before preprocessing
    Skipped(SkipReason),
    /// Frame failed preprocessing in a recoverable way
    Dropped(PipelineError),
}

/// Why a completion did not reach the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Delivered while recognition is inactive
    Inactive,
    /// Submitted during an earlier activation
    StaleSession,
}

/// Effect of one OCR completion on the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The OCR engine read nothing
    NoRecognition,
    /// Result arrived too late to count
    Discarded(DiscardReason),
    /// Result was added; the window holds this many values
    Pending(usize),
    /// Window settled on this value and was cleared
    Settled(String),
}

/// All mutable engine state
#[derive(Debug)]
pub struct Session {
    state: EngineState,
    window: ConsensusQueue<String>,
    policy: CompletionPolicy,
    /// Bumped on every activation so completions can be tied to one
    epoch: u64,
    pub(crate) roi: Option<Rect>,
    pub(crate) in_flight: usize,
}

impl Session {
    pub fn new(window_size: usize, policy: CompletionPolicy, start_active: bool) -> Self {
        Self {
            state: if start_active {
                EngineState::Waiting
            } else {
                EngineState::Inactive
            },
            window: ConsensusQueue::new(window_size),
            policy,
            epoch: 0,
            roi: None,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != EngineState::Inactive
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Start a fresh activation; returns false if already active
    pub fn activate(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.window.clear();
        self.epoch += 1;
        self.state = EngineState::Waiting;
        true
    }

    /// Stop recognising and forget partial history; returns false if already inactive
    pub fn deactivate(&mut self) -> bool {
        self.window.clear();
        if !self.is_active() {
            return false;
        }
        self.state = EngineState::Inactive;
        true
    }

    /// Completion handler for a result submitted during activation `epoch`
    pub fn accept(&mut self, epoch: u64, text: Option<String>) -> Delivery {
        let Some(text) = text else {
            return Delivery::NoRecognition;
        };
        if !self.is_active() {
            return Delivery::Discarded(DiscardReason::Inactive);
        }
        if epoch != self.epoch {
            return Delivery::Discarded(DiscardReason::StaleSession);
        }

        self.window.enqueue(text);
        if !self.window.settled() {
            return Delivery::Pending(self.window.len());
        }

        self.state = EngineState::Settled;
        let value = self.window.take();
        self.window.clear();
        self.state = match self.policy {
            CompletionPolicy::KeepRunning => EngineState::Waiting,
            CompletionPolicy::StopAfterFirst => EngineState::Inactive,
        };

        match value {
            Some(value) => Delivery::Settled(value),
            None => Delivery::Pending(0),
        }
    }
}
