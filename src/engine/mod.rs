//! Recognition Engine
//!
//! Ties the pipeline together: frames come in from the frame source, are
//! prepared on the caller's thread, and are recognised asynchronously on the
//! injected tokio runtime. Completions feed the consensus window and the
//! result callback fires once per settled window.
//!
//! Completions may overlap and arrive out of order. Consensus is evaluated in
//! arrival order, not capture order.

pub mod state;

pub use state::{
    CompletionPolicy, Delivery, DiscardReason, EngineState, FrameOutcome, Session, SkipReason,
};

use crossbeam_channel::{bounded, Receiver, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use crate::analysis::RecognitionReliability;
use crate::capture::RawFrame;
use crate::error::PipelineResult;
use crate::vision::{FramePreprocessor, ImagePreprocessor, OcrEngine, Rect, Size};

/// Callback receiving each settled value
pub type ResultCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Construction-time engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Consensus window size tier
    pub reliability: RecognitionReliability,
    /// Behaviour after a value is reported
    pub policy: CompletionPolicy,
    /// Whether recognition runs right after construction
    pub start_active: bool,
    /// Maximum OCR operations running at once; extra frames are dropped
    pub max_in_flight: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            reliability: RecognitionReliability::Verifiable,
            policy: CompletionPolicy::KeepRunning,
            start_active: true,
            max_in_flight: 4,
        }
    }
}

/// Builder for [`RecognitionEngine`]
pub struct EngineBuilder {
    options: EngineOptions,
    preprocessor: Option<Arc<dyn FramePreprocessor>>,
    on_result: Option<ResultCallback>,
}

impl EngineBuilder {
    /// Replace the default preprocessing pipeline
    pub fn preprocessor(mut self, preprocessor: Arc<dyn FramePreprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Register the callback for settled values
    pub fn on_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(callback));
        self
    }

    /// Build the engine, spawning recognition work onto `runtime`
    pub fn build(self, ocr: Arc<dyn OcrEngine>, runtime: Handle) -> RecognitionEngine {
        let options = self.options;
        let session = Session::new(
            options.reliability.window_size(),
            options.policy,
            options.start_active,
        );

        info!(
            "Recognition engine created: {:?} (window {}), {:?}, active={}",
            options.reliability,
            options.reliability.window_size(),
            options.policy,
            options.start_active
        );

        let preprocessor: Arc<dyn FramePreprocessor> = match self.preprocessor {
            Some(preprocessor) => preprocessor,
            None => Arc::new(ImagePreprocessor::new()),
        };
        let on_result: ResultCallback = match self.on_result {
            Some(callback) => callback,
            None => Arc::new(|text: String| {
                debug!("No result callback registered, dropping {:?}", text)
            }),
        };

        RecognitionEngine {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                preprocessor,
                ocr,
                runtime,
                on_result,
                max_in_flight: options.max_in_flight.max(1),
                idle: Notify::new(),
            }),
        }
    }
}

/// Real-time recognition engine
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RecognitionEngine {
    shared: Arc<Shared>,
}

struct Shared {
    session: Mutex<Session>,
    preprocessor: Arc<dyn FramePreprocessor>,
    ocr: Arc<dyn OcrEngine>,
    runtime: Handle,
    on_result: ResultCallback,
    max_in_flight: usize,
    idle: Notify,
}

impl RecognitionEngine {
    /// Start building an engine
    pub fn builder(options: EngineOptions) -> EngineBuilder {
        EngineBuilder {
            options,
            preprocessor: None,
            on_result: None,
        }
    }

    /// Set the region of interest in preview coordinates; applies from the next frame
    pub fn set_region_of_interest(&self, roi: Option<Rect>) -> PipelineResult<()> {
        if let Some(roi) = &roi {
            roi.validate()?;
        }
        self.shared.session.lock().roi = roi;
        debug!("Region of interest set to {:?}", roi);
        Ok(())
    }

    pub fn region_of_interest(&self) -> Option<Rect> {
        self.shared.session.lock().roi
    }

    /// Resume recognition with an empty window
    pub fn activate(&self) {
        if self.shared.session.lock().activate() {
            info!("Recognition activated");
        }
    }

    /// Stop recognition; in-flight results will be discarded
    pub fn deactivate(&self) {
        if self.shared.session.lock().deactivate() {
            info!("Recognition deactivated");
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.session.lock().state()
    }

    pub fn is_active(&self) -> bool {
        self.shared.session.lock().is_active()
    }

    /// Number of results currently in the consensus window
    pub fn window_len(&self) -> usize {
        self.shared.session.lock().window_len()
    }

    /// Number of OCR operations not yet completed
    pub fn in_flight(&self) -> usize {
        self.shared.session.lock().in_flight
    }

    /// Handle a frame shown on a preview of size `preview`
    ///
    /// Only `InvalidGeometry` is returned as an error; every other failure
    /// drops the frame and is reported as [`FrameOutcome::Dropped`].
    pub fn on_frame(&self, frame: RawFrame, preview: Size) -> PipelineResult<FrameOutcome> {
        let (epoch, roi) = {
            let session = self.shared.session.lock();
            if let Some(reason) = self.shared.admission(&session) {
                trace!("Skipping frame: {:?}", reason);
                return Ok(FrameOutcome::Skipped(reason));
            }
            (session.epoch(), session.roi)
        };

        let image = match self.shared.preprocessor.prepare(frame, preview, roi) {
            Ok(image) => image,
            Err(e) if e.is_recoverable() => {
                debug!("Dropped frame: {}", e);
                return Ok(FrameOutcome::Dropped(e));
            }
            Err(e) => return Err(e),
        };

        // State may have changed while preprocessing
        let guard = {
            let mut session = self.shared.session.lock();
            if session.epoch() != epoch {
                return Ok(FrameOutcome::Skipped(SkipReason::Inactive));
            }
            if let Some(reason) = self.shared.admission(&session) {
                return Ok(FrameOutcome::Skipped(reason));
            }
            session.in_flight += 1;
            InFlightGuard {
                shared: Arc::clone(&self.shared),
            }
        };

        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            let _guard = guard;
            let text = shared.ocr.recognize(image).await;
            shared.deliver(Some(epoch), text);
        });

        Ok(FrameOutcome::Submitted)
    }

    /// Feed an OCR completion directly, as if it belonged to the current activation
    pub fn on_recognition_result(&self, text: Option<String>) -> Delivery {
        self.shared.deliver(None, text)
    }

    /// Wait until every submitted OCR operation has completed
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.session.lock().in_flight == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Shared {
    fn admission(&self, session: &Session) -> Option<SkipReason> {
        if session.state() != EngineState::Waiting {
            Some(SkipReason::Inactive)
        } else if session.in_flight >= self.max_in_flight {
            Some(SkipReason::Busy)
        } else {
            None
        }
    }

    /// Completion handler; `epoch` is `None` for the current activation
    fn deliver(&self, epoch: Option<u64>, text: Option<String>) -> Delivery {
        let delivery = {
            let mut session = self.session.lock();
            let epoch = epoch.unwrap_or_else(|| session.epoch());
            session.accept(epoch, text)
        };

        match &delivery {
            Delivery::Settled(value) => {
                info!("Recognition settled on {:?}", value);
                (self.on_result)(value.clone());
            }
            Delivery::Pending(len) => trace!("Result queued, window holds {}", len),
            Delivery::NoRecognition => trace!("OCR returned no result"),
            Delivery::Discarded(reason) => debug!("Discarded late result: {:?}", reason),
        }
        delivery
    }
}

/// Counts one OCR operation as in flight until dropped
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let idle = {
            let mut session = self.shared.session.lock();
            session.in_flight = session.in_flight.saturating_sub(1);
            session.in_flight == 0
        };
        if idle {
            self.shared.idle.notify_waiters();
        }
    }
}

/// Callback backed by a bounded channel
///
/// Values are dropped with a warning when the receiver falls `capacity` behind.
pub fn result_channel(capacity: usize) -> (impl Fn(String) + Send + Sync + 'static, Receiver<String>) {
    let (tx, rx) = bounded(capacity.max(1));
    let callback = move |text: String| match tx.try_send(text) {
        Ok(()) => {}
        Err(TrySendError::Full(text)) => warn!("Result channel full, dropping {:?}", text),
        Err(TrySendError::Disconnected(_)) => debug!("Result receiver gone"),
    };
    (callback, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::vision::TranscriptOcr;
    use async_trait::async_trait;
    use image::GrayImage;
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    const PREVIEW: Size = Size {
        width: 100.0,
        height: 100.0,
    };

    fn frame() -> RawFrame {
        RawFrame::rgba(vec![255; 10 * 10 * 4], 10, 10)
    }

    fn options(reliability: RecognitionReliability, policy: CompletionPolicy) -> EngineOptions {
        EngineOptions {
            reliability,
            policy,
            ..EngineOptions::default()
        }
    }

    /// Completes each call when the test fires the matching sender
    struct GatedOcr {
        gates: parking_lot::Mutex<VecDeque<oneshot::Receiver<Option<String>>>>,
    }

    impl GatedOcr {
        fn new(count: usize) -> (Arc<Self>, Vec<oneshot::Sender<Option<String>>>) {
            let (senders, receivers): (Vec<_>, VecDeque<_>) =
                (0..count).map(|_| oneshot::channel()).unzip();
            let ocr = Arc::new(Self {
                gates: parking_lot::Mutex::new(receivers),
            });
            (ocr, senders)
        }
    }

    #[async_trait]
    impl OcrEngine for GatedOcr {
        async fn recognize(&self, _image: GrayImage) -> Option<String> {
            let gate = self.gates.lock().pop_front();
            match gate {
                Some(rx) => rx.await.ok().flatten(),
                None => None,
            }
        }
    }

    #[tokio::test]
    async fn test_frames_reach_consensus() {
        let (callback, results) = result_channel(8);
        let ocr = Arc::new(TranscriptOcr::new([Some("CAT"), Some("CAT"), Some("CAT")]));
        let engine = RecognitionEngine::builder(EngineOptions::default())
            .on_result(callback)
            .build(ocr, Handle::current());

        for _ in 0..3 {
            assert_eq!(engine.on_frame(frame(), PREVIEW), Ok(FrameOutcome::Submitted));
        }
        engine.wait_idle().await;

        assert_eq!(results.try_recv().ok().as_deref(), Some("CAT"));
        assert!(results.try_recv().is_err());
        assert_eq!(engine.window_len(), 0);
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_inactive_engine_skips_frames() {
        let ocr = Arc::new(TranscriptOcr::new([Some("CAT")]));
        let engine = RecognitionEngine::builder(EngineOptions {
            start_active: false,
            ..EngineOptions::default()
        })
        .build(ocr.clone(), Handle::current());

        assert_eq!(
            engine.on_frame(frame(), PREVIEW),
            Ok(FrameOutcome::Skipped(SkipReason::Inactive))
        );
        engine.wait_idle().await;
        assert_eq!(ocr.remaining(), 1);
        assert_eq!(engine.window_len(), 0);
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped_not_submitted() {
        let ocr = Arc::new(TranscriptOcr::new([Some("CAT")]));
        let engine = RecognitionEngine::builder(EngineOptions::default()).build(ocr, Handle::current());

        let outcome = engine.on_frame(RawFrame::encoded(vec![0, 1, 2]), PREVIEW).unwrap();
        assert!(matches!(outcome, FrameOutcome::Dropped(PipelineError::FrameDecodeFailure(_))));

        engine
            .set_region_of_interest(Some(Rect::new(500.0, 500.0, 10.0, 10.0)))
            .unwrap();
        assert_eq!(
            engine.on_frame(frame(), PREVIEW),
            Ok(FrameOutcome::Dropped(PipelineError::EmptyRegion))
        );
        assert_eq!(engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_header_is_dropped() {
        let ocr = Arc::new(TranscriptOcr::new([Some("CAT")]));
        let engine = RecognitionEngine::builder(EngineOptions::default()).build(ocr.clone(), Handle::current());

        let frame = RawFrame::rgba(vec![0; 16], 1 << 31, 1 << 31);
        let outcome = engine.on_frame(frame, PREVIEW).unwrap();

        assert!(matches!(outcome, FrameOutcome::Dropped(PipelineError::FrameDecodeFailure(_))));
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(ocr.remaining(), 1);
    }

    #[tokio::test]
    async fn test_invalid_geometry_is_surfaced() {
        let ocr = Arc::new(TranscriptOcr::default());
        let engine = RecognitionEngine::builder(EngineOptions::default()).build(ocr, Handle::current());

        let result = engine.on_frame(frame(), Size::new(0.0, 0.0));
        assert!(matches!(result, Err(PipelineError::InvalidGeometry(_))));

        let result = engine.set_region_of_interest(Some(Rect::new(0.0, 0.0, 0.0, 5.0)));
        assert!(matches!(result, Err(PipelineError::InvalidGeometry(_))));
        assert_eq!(engine.region_of_interest(), None);
    }

    #[tokio::test]
    async fn test_in_flight_limit_drops_extra_frames() {
        let (ocr, senders) = GatedOcr::new(2);
        let engine = RecognitionEngine::builder(EngineOptions {
            max_in_flight: 2,
            ..EngineOptions::default()
        })
        .build(ocr, Handle::current());

        assert_eq!(engine.on_frame(frame(), PREVIEW), Ok(FrameOutcome::Submitted));
        assert_eq!(engine.on_frame(frame(), PREVIEW), Ok(FrameOutcome::Submitted));
        assert_eq!(
            engine.on_frame(frame(), PREVIEW),
            Ok(FrameOutcome::Skipped(SkipReason::Busy))
        );

        for tx in senders {
            let _ = tx.send(None);
        }
        engine.wait_idle().await;
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(engine.on_frame(frame(), PREVIEW), Ok(FrameOutcome::Submitted));
    }

    #[tokio::test]
    async fn test_out_of_order_completions_use_arrival_order() {
        let (callback, results) = result_channel(8);
        let (ocr, senders) = GatedOcr::new(4);
        let engine = RecognitionEngine::builder(EngineOptions::default())
            .on_result(callback)
            .build(ocr, Handle::current());

        for _ in 0..4 {
            assert_eq!(engine.on_frame(frame(), PREVIEW), Ok(FrameOutcome::Submitted));
        }
        // Let every task pick up its gate
        tokio::task::yield_now().await;

        // Captured as CAT, DOG, CAT, CAT (never three in a row), but the DOG
        // frame completes first
        let mut senders: Vec<Option<oneshot::Sender<Option<String>>>> =
            senders.into_iter().map(Some).collect();
        for (index, text) in [(1, "DOG"), (0, "CAT"), (2, "CAT"), (3, "CAT")] {
            if let Some(tx) = senders[index].take() {
                let _ = tx.send(Some(text.to_string()));
            }
            tokio::task::yield_now().await;
        }
        engine.wait_idle().await;

        assert_eq!(results.try_recv().ok().as_deref(), Some("CAT"));
        assert_eq!(engine.window_len(), 0);
    }

    #[tokio::test]
    async fn test_late_completion_after_deactivate_is_discarded() {
        let (callback, results) = result_channel(8);
        let (ocr, senders) = GatedOcr::new(3);
        let engine = RecognitionEngine::builder(EngineOptions::default())
            .on_result(callback)
            .build(ocr, Handle::current());

        for _ in 0..3 {
            engine.on_frame(frame(), PREVIEW).unwrap();
        }
        tokio::task::yield_now().await;
        engine.deactivate();

        for tx in senders {
            let _ = tx.send(Some("CAT".into()));
        }
        engine.wait_idle().await;

        assert!(results.try_recv().is_err());
        assert_eq!(engine.window_len(), 0);
        assert_eq!(engine.state(), EngineState::Inactive);
    }

    #[tokio::test]
    async fn test_completion_from_previous_activation_is_discarded() {
        let (callback, results) = result_channel(8);
        let (ocr, senders) = GatedOcr::new(1);
        let engine = RecognitionEngine::builder(EngineOptions::default())
            .on_result(callback)
            .build(ocr, Handle::current());

        engine.on_frame(frame(), PREVIEW).unwrap();
        tokio::task::yield_now().await;
        engine.deactivate();
        engine.activate();
        engine.on_recognition_result(Some("CAT".into()));
        engine.on_recognition_result(Some("CAT".into()));

        for tx in senders {
            let _ = tx.send(Some("CAT".into()));
        }
        engine.wait_idle().await;

        assert!(results.try_recv().is_err());
        assert_eq!(engine.window_len(), 2);
    }

    #[tokio::test]
    async fn test_stop_after_first_policy() {
        let (callback, results) = result_channel(8);
        let ocr = Arc::new(TranscriptOcr::new(vec![Some("CAT"); 6]));
        let engine = RecognitionEngine::builder(options(
            RecognitionReliability::Verifiable,
            CompletionPolicy::StopAfterFirst,
        ))
        .on_result(callback)
        .build(ocr, Handle::current());

        for _ in 0..3 {
            engine.on_frame(frame(), PREVIEW).unwrap();
        }
        engine.wait_idle().await;

        assert_eq!(results.try_recv().ok().as_deref(), Some("CAT"));
        assert_eq!(engine.state(), EngineState::Inactive);
        assert_eq!(
            engine.on_frame(frame(), PREVIEW),
            Ok(FrameOutcome::Skipped(SkipReason::Inactive))
        );
    }

    #[tokio::test]
    async fn test_keep_running_policy_reports_again() {
        let (callback, results) = result_channel(8);
        let ocr = Arc::new(TranscriptOcr::new(vec![Some("CAT"); 6]));
        let engine = RecognitionEngine::builder(options(
            RecognitionReliability::Verifiable,
            CompletionPolicy::KeepRunning,
        ))
        .on_result(callback)
        .build(ocr, Handle::current());

        for _ in 0..6 {
            engine.on_frame(frame(), PREVIEW).unwrap();
            engine.wait_idle().await;
        }

        assert_eq!(results.try_iter().collect::<Vec<_>>(), vec!["CAT", "CAT"]);
        assert_eq!(engine.state(), EngineState::Waiting);
    }

    #[tokio::test]
    async fn test_settled_state_is_not_observable() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let engine_slot: Arc<parking_lot::Mutex<Option<RecognitionEngine>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let ocr = Arc::new(TranscriptOcr::new(vec![Some("CAT"); 3]));
        let engine = {
            let seen = Arc::clone(&seen);
            let engine_slot = Arc::clone(&engine_slot);
            RecognitionEngine::builder(EngineOptions::default())
                .on_result(move |_| {
                    if let Some(engine) = engine_slot.lock().as_ref() {
                        seen.lock().push(engine.state());
                    }
                })
                .build(ocr, Handle::current())
        };
        *engine_slot.lock() = Some(engine.clone());

        for _ in 0..3 {
            engine.on_frame(frame(), PREVIEW).unwrap();
            engine.wait_idle().await;
        }

        // The callback runs after the settle step has finished
        assert_eq!(*seen.lock(), vec![EngineState::Waiting]);
        assert_eq!(engine.state(), EngineState::Waiting);
        engine_slot.lock().take();
    }

    #[test]
    fn test_result_channel_drops_when_full() {
        let (callback, results) = result_channel(1);
        callback("first".into());
        callback("second".into());
        assert_eq!(results.try_iter().collect::<Vec<_>>(), vec!["first"]);
    }
}
