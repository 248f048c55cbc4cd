//! Session Controller — lifecycle, retries, generation counters,
//! cancellation, and backend mode selection (spec §4.5, §5).
//!
//! This is the single serialization context the rest of the crate assumes:
//! every mutation to the cursor, generation, pending-restart state, and
//! session state goes through `SessionController::handle_message`. A host
//! binary owns the event loop that feeds messages to it one at a time —
//! this struct does not spawn its own driving task.

pub mod events;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::backend::{BackendEvent, TaggedEvent, TranscriptionBackend};
use crate::config::EngineSettings;
use crate::error::{Result, TrackerError};
use crate::matcher::{BackendKind, FuzzyMatcher};
use crate::script::{CompactIndex, PageChars, Script};

use events::{AudioLevelRing, SessionSnapshot};

const MAX_RETRIES: u32 = 10;
const RETRY_STEP_MS: i64 = 500;
const RETRY_CAP_MS: i64 = 1500;
const DEVICE_SWITCH_SUPPRESSION_MS: i64 = 1000;

/// `Idle → Authorizing → Running → (Retrying | Paused) → Idle` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authorizing,
    Running,
    Retrying,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyPaneKind {
    Microphone,
    SpeechRecognition,
}

/// Seam for the OS permission prompts (§6 "Invoked"). No real platform
/// binding exists in this workspace, so tests and hosts supply their own.
pub trait AuthorizationProvider: Send {
    fn request_microphone_authorization(&mut self) -> AuthorizationStatus;
    fn request_speech_recognition_authorization(&mut self) -> AuthorizationStatus;
    fn open_system_privacy_pane(&mut self, kind: PrivacyPaneKind);
}

/// (Re)builds the configured backend variant. Called on every `start` and
/// every internal restart, since "components are recreated on restart"
/// (spec §9 design notes) rather than reused across backend failures.
pub trait BackendFactory: Send {
    fn create(&self, settings: &EngineSettings) -> Result<Box<dyn TranscriptionBackend>>;
}

/// One driving message for the controller's single serialization context.
#[derive(Debug, Clone)]
pub enum ControllerMessage {
    Backend(TaggedEvent),
    RestartDue { generation: u64, epoch: u64 },
    /// The Audio Capture's `on_config_change` signal (device unplugged,
    /// sample rate changed, ...). Carries no generation of its own — the
    /// controller applies its own suppression-window logic.
    ConfigChanged,
}

pub struct SessionController {
    state: SessionState,
    generation: u64,
    retry_count: u32,
    intentional_stop: bool,

    page: Option<PageChars>,
    compact: Option<CompactIndex>,
    page_index: usize,
    page_count: usize,

    recognized_char_count: usize,
    match_start: usize,
    matcher: FuzzyMatcher,
    reached_end_at: Option<DateTime<Utc>>,
    advance_pulse_pending: bool,
    dismiss_pulse_pending: bool,

    backend: Option<Box<dyn TranscriptionBackend>>,
    backend_kind: BackendKind,
    backend_factory: Box<dyn BackendFactory>,
    authorization: Box<dyn AuthorizationProvider>,

    pending_restart_epoch: Option<u64>,
    restart_epoch_counter: u64,
    suppress_config_change_until: Option<DateTime<Utc>>,

    runtime: tokio::runtime::Handle,
    messages_tx: UnboundedSender<ControllerMessage>,

    settings: EngineSettings,
    audio_levels: AudioLevelRing,
    last_spoken_text: String,
    error: Option<String>,
}

impl SessionController {
    pub fn new(
        settings: EngineSettings,
        backend_factory: Box<dyn BackendFactory>,
        authorization: Box<dyn AuthorizationProvider>,
        runtime: tokio::runtime::Handle,
        messages_tx: UnboundedSender<ControllerMessage>,
    ) -> Self {
        let backend_kind = backend_kind_for(&settings);
        Self {
            state: SessionState::Idle,
            generation: 0,
            retry_count: 0,
            intentional_stop: false,
            page: None,
            compact: None,
            page_index: 0,
            page_count: 0,
            recognized_char_count: 0,
            match_start: 0,
            matcher: FuzzyMatcher::new(),
            reached_end_at: None,
            advance_pulse_pending: false,
            dismiss_pulse_pending: false,
            backend: None,
            backend_kind,
            backend_factory,
            authorization,
            pending_restart_epoch: None,
            restart_epoch_counter: 0,
            suppress_config_change_until: None,
            runtime,
            messages_tx,
            settings,
            audio_levels: AudioLevelRing::new(),
            last_spoken_text: String::new(),
            error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn recognized_char_count(&self) -> usize {
        self.recognized_char_count
    }

    pub fn match_start(&self) -> usize {
        self.match_start
    }

    /// Starts a session against `script`'s page `page_index`: requests
    /// authorization, builds the compact index, and spawns the configured
    /// backend.
    pub fn start(&mut self, script: &Script, page_index: usize) -> Result<()> {
        if self.state == SessionState::Running || self.state == SessionState::Authorizing {
            return Err(TrackerError::AlreadyRunning);
        }

        let page_text = script.page(page_index).ok_or_else(|| TrackerError::InvalidConfiguration("page index out of range".into()))?;
        if page_text.is_empty() {
            return Err(TrackerError::InvalidConfiguration("page is empty".into()));
        }

        self.generation += 1;
        self.cancel_pending_restart();
        self.intentional_stop = false;
        self.retry_count = 0;
        self.matcher.reset();
        self.recognized_char_count = 0;
        self.match_start = 0;
        self.reached_end_at = None;
        self.advance_pulse_pending = false;
        self.dismiss_pulse_pending = false;
        self.error = None;

        let page_chars = PageChars::new(page_text);
        self.compact = Some(CompactIndex::build(&page_chars));
        self.page = Some(page_chars);
        self.page_index = page_index;
        self.page_count = script.page_count();

        self.state = SessionState::Authorizing;

        if self.authorization.request_microphone_authorization() != AuthorizationStatus::Granted {
            self.authorization.open_system_privacy_pane(PrivacyPaneKind::Microphone);
            self.error = Some("microphone access is required — enable it in system settings".into());
            self.state = SessionState::Idle;
            return Err(TrackerError::PermissionDenied("microphone".into()));
        }

        if self.backend_kind == BackendKind::Cumulative {
            if self.authorization.request_speech_recognition_authorization() != AuthorizationStatus::Granted {
                self.authorization.open_system_privacy_pane(PrivacyPaneKind::SpeechRecognition);
                self.error = Some("speech recognition access is required — enable it in system settings".into());
                self.state = SessionState::Idle;
                return Err(TrackerError::PermissionDenied("speech recognition".into()));
            }
        }

        self.spawn_backend()?;
        self.state = SessionState::Running;
        info!(generation = self.generation, "session running");
        Ok(())
    }

    /// Cancels pending restarts, tears the backend down, and returns to
    /// `Idle`.
    pub fn stop(&mut self) {
        self.intentional_stop = true;
        self.cancel_pending_restart();
        self.teardown_backend();
        self.generation += 1;
        self.state = SessionState::Idle;
        self.page = None;
        self.compact = None;
        self.recognized_char_count = 0;
        self.match_start = 0;
        self.matcher.reset();
    }

    /// Like `stop`, but additionally saturates the retry counter so a
    /// lingering exit/error callback cannot trigger auto-recovery.
    pub fn force_stop(&mut self) {
        self.stop();
        self.retry_count = MAX_RETRIES;
    }

    /// Resumes a `Paused` session at the current cursor.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != SessionState::Paused {
            return Err(TrackerError::NotRunning);
        }
        self.match_start = self.recognized_char_count;
        self.retry_count = 0;
        self.error = None;
        self.spawn_backend()?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Explicit user-driven jump. Bumps generation (jumps are a named
    /// non-monotone transition per spec §5 ordering guarantees).
    pub fn jump_to(&mut self, target: usize) {
        let Some(page) = &self.page else { return };
        let clamped = target.min(page.len());
        self.generation += 1;
        self.recognized_char_count = clamped;
        self.match_start = clamped;
        self.matcher.reset();
        self.reached_end_at = None;
        self.advance_pulse_pending = false;
        self.dismiss_pulse_pending = false;
    }

    /// Processes one driving message. The only mutator of session state —
    /// callers must invoke this from a single task.
    pub fn handle_message(&mut self, message: ControllerMessage, now: DateTime<Utc>) {
        match message {
            ControllerMessage::Backend(tagged) => self.handle_backend_event(tagged, now),
            ControllerMessage::RestartDue { generation, epoch } => self.handle_restart_due(generation, epoch, now),
            ControllerMessage::ConfigChanged => self.handle_config_change(now),
        }
    }

    fn handle_backend_event(&mut self, tagged: TaggedEvent, now: DateTime<Utc>) {
        if tagged.generation != self.generation {
            return;
        }
        match tagged.event {
            BackendEvent::Hypothesis(text) => self.apply_hypothesis(&text, now),
            BackendEvent::Error(line) => {
                warn!(line = %line, "backend runtime error");
                if self.state == SessionState::Running {
                    self.schedule_retry(Some(line), now);
                }
            }
            BackendEvent::Exited => {
                let dismissed = self.dismiss_pulse_pending || self.state == SessionState::Idle;
                let page_present = self.page.is_some();
                if self.state == SessionState::Running && !dismissed && page_present {
                    self.schedule_retry(None, now);
                }
            }
        }
    }

    fn apply_hypothesis(&mut self, text: &str, now: DateTime<Utc>) {
        let (Some(page), Some(compact)) = (&self.page, &self.compact) else { return };

        let outcome = self.matcher.update(page, compact, self.match_start, self.recognized_char_count, text, self.backend_kind, now);
        self.recognized_char_count = outcome.recognized_char_count;
        self.match_start = outcome.match_start;
        self.last_spoken_text = text.to_string();
        self.retry_count = 0;
        self.error = None;
        if self.state == SessionState::Retrying {
            self.state = SessionState::Running;
        }

        if self.recognized_char_count >= page.len() && self.reached_end_at.is_none() {
            self.reached_end_at = Some(now);
            if self.page_index + 1 >= self.page_count {
                self.dismiss_pulse_pending = true;
            } else if self.settings.auto_next_page {
                self.advance_pulse_pending = true;
            }
        }
    }

    fn schedule_retry(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        if self.intentional_stop {
            return;
        }
        if self.retry_count >= MAX_RETRIES {
            self.state = SessionState::Paused;
            self.error = reason.or_else(|| Some("backend exhausted retries".into()));
            self.pending_restart_epoch = None;
            return;
        }

        self.retry_count += 1;
        self.state = SessionState::Retrying;
        self.teardown_backend();

        let delay_ms = (self.retry_count as i64 * RETRY_STEP_MS).min(RETRY_CAP_MS);
        self.schedule_restart_timer(delay_ms, now);
    }

    fn handle_restart_due(&mut self, generation: u64, epoch: u64, _now: DateTime<Utc>) {
        if generation != self.generation || self.pending_restart_epoch != Some(epoch) {
            return;
        }
        self.pending_restart_epoch = None;
        if self.intentional_stop {
            return;
        }
        if let Err(e) = self.spawn_backend() {
            error!(error = %e, "restart failed");
            self.state = SessionState::Paused;
            self.error = Some(e.to_string());
            return;
        }
        self.state = SessionState::Running;
    }

    fn handle_config_change(&mut self, now: DateTime<Utc>) {
        if let Some(until) = self.suppress_config_change_until {
            if now < until {
                return;
            }
        }
        if self.page.is_none() {
            return;
        }

        self.suppress_config_change_until = Some(now + chrono::Duration::milliseconds(DEVICE_SWITCH_SUPPRESSION_MS));
        self.teardown_backend();
        self.generation += 1;
        self.retry_count = 0;
        self.state = SessionState::Retrying;
        self.retry_count += 1;
        let delay_ms = (self.retry_count as i64 * RETRY_STEP_MS).min(RETRY_CAP_MS);
        self.schedule_restart_timer(delay_ms, now);
    }

    fn schedule_restart_timer(&mut self, delay_ms: i64, _now: DateTime<Utc>) {
        self.restart_epoch_counter += 1;
        let epoch = self.restart_epoch_counter;
        self.pending_restart_epoch = Some(epoch);

        let generation = self.generation;
        let tx = self.messages_tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms.max(0) as u64)).await;
            let _ = tx.send(ControllerMessage::RestartDue { generation, epoch });
        });
    }

    fn cancel_pending_restart(&mut self) {
        // The spawned timer task still fires, but `handle_restart_due`
        // checks `pending_restart_epoch` and discards it once cleared —
        // coalescing without needing a cancellation handle per se.
        self.pending_restart_epoch = None;
    }

    fn spawn_backend(&mut self) -> Result<()> {
        self.teardown_backend();
        let mut backend = self.backend_factory.create(&self.settings)?;
        self.backend_kind = backend.kind();

        let (backend_tx, mut backend_rx) = tokio::sync::mpsc::unbounded_channel::<BackendEvent>();
        backend.start(&self.runtime, backend_tx)?;

        let generation = self.generation;
        let forward_tx = self.messages_tx.clone();
        self.runtime.spawn(async move {
            while let Some(event) = backend_rx.recv().await {
                if forward_tx.send(ControllerMessage::Backend(TaggedEvent { generation, event })).is_err() {
                    break;
                }
            }
        });

        self.backend = Some(backend);
        Ok(())
    }

    fn teardown_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop();
        }
    }

    /// Records one RMS level sample for the published audio level ring.
    pub fn push_audio_level(&mut self, level: f32) {
        self.audio_levels.push(level);
    }

    /// Snapshots published state and consumes any pending edge-trigger
    /// pulses (they read as `true` exactly once).
    pub fn snapshot(&mut self) -> SessionSnapshot {
        let should_advance_page = std::mem::take(&mut self.advance_pulse_pending);
        let should_dismiss = std::mem::take(&mut self.dismiss_pulse_pending);
        SessionSnapshot {
            recognized_char_count: self.recognized_char_count,
            is_listening: self.state == SessionState::Running,
            error: self.error.clone(),
            audio_levels: self.audio_levels.snapshot(),
            last_spoken_text: self.last_spoken_text.clone(),
            is_speaking: self.audio_levels.is_speaking(),
            should_dismiss,
            should_advance_page,
        }
    }
}

fn backend_kind_for(settings: &EngineSettings) -> BackendKind {
    match settings.speech_engine_mode {
        crate::config::SpeechEngineMode::Platform => BackendKind::Cumulative,
        crate::config::SpeechEngineMode::ExternalStream => BackendKind::Segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct GrantAll;
    impl AuthorizationProvider for GrantAll {
        fn request_microphone_authorization(&mut self) -> AuthorizationStatus {
            AuthorizationStatus::Granted
        }
        fn request_speech_recognition_authorization(&mut self) -> AuthorizationStatus {
            AuthorizationStatus::Granted
        }
        fn open_system_privacy_pane(&mut self, _kind: PrivacyPaneKind) {}
    }

    struct DenyMic;
    impl AuthorizationProvider for DenyMic {
        fn request_microphone_authorization(&mut self) -> AuthorizationStatus {
            AuthorizationStatus::Denied
        }
        fn request_speech_recognition_authorization(&mut self) -> AuthorizationStatus {
            AuthorizationStatus::Granted
        }
        fn open_system_privacy_pane(&mut self, _kind: PrivacyPaneKind) {}
    }

    struct NullBackend;
    impl TranscriptionBackend for NullBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Cumulative
        }
        fn start(&mut self, _runtime: &tokio::runtime::Handle, _sink: UnboundedSender<BackendEvent>) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    struct CountingFactory(Arc<AtomicUsize>);
    impl BackendFactory for CountingFactory {
        fn create(&self, _settings: &EngineSettings) -> Result<Box<dyn TranscriptionBackend>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullBackend))
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().expect("tokio runtime")
    }

    fn build_controller(runtime: &tokio::runtime::Runtime, spawn_count: Arc<AtomicUsize>) -> (SessionController, tokio::sync::mpsc::UnboundedReceiver<ControllerMessage>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let controller = SessionController::new(
            EngineSettings::default(),
            Box::new(CountingFactory(spawn_count)),
            Box::new(GrantAll),
            runtime.handle().clone(),
            tx,
        );
        (controller, rx)
    }

    #[test]
    fn start_denied_microphone_surfaces_permission_error() {
        let rt = runtime();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut controller = SessionController::new(EngineSettings::default(), Box::new(CountingFactory(Arc::new(AtomicUsize::new(0)))), Box::new(DenyMic), rt.handle().clone(), tx);
        let script = Script::new(vec!["hello world".into()]);
        let err = controller.start(&script, 0).unwrap_err();
        assert!(matches!(err, TrackerError::PermissionDenied(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn successful_start_reaches_running_with_generation_one() {
        let rt = runtime();
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let (mut controller, _rx) = build_controller(&rt, spawn_count.clone());
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).expect("start succeeds");
        assert_eq!(controller.state(), SessionState::Running);
        assert_eq!(controller.generation(), 1);
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_generation_backend_event_is_dropped() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).unwrap();

        let stale = TaggedEvent { generation: 0, event: BackendEvent::Hypothesis("hello".into()) };
        controller.handle_message(ControllerMessage::Backend(stale), now());
        assert_eq!(controller.recognized_char_count(), 0);

        let current = TaggedEvent { generation: controller.generation(), event: BackendEvent::Hypothesis("hello".into()) };
        controller.handle_message(ControllerMessage::Backend(current), now());
        assert_eq!(controller.recognized_char_count(), 5);
    }

    #[test]
    fn backend_error_schedules_retry_then_retry_resets_on_success() {
        let rt = runtime();
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let (mut controller, _rx) = build_controller(&rt, spawn_count.clone());
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).unwrap();
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        let gen = controller.generation();
        controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Error("dyld: missing lib".into()) }), now());
        assert_eq!(controller.state(), SessionState::Retrying);

        controller.handle_message(ControllerMessage::RestartDue { generation: gen, epoch: 1 }, now());
        assert_eq!(controller.state(), SessionState::Running);
        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);

        controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Hypothesis("hello".into()) }), now());
        assert_eq!(controller.recognized_char_count(), 5);
    }

    #[test]
    fn retries_exhaust_into_paused_state() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).unwrap();
        let gen = controller.generation();

        for _ in 0..MAX_RETRIES {
            controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Error("failed again".into()) }), now());
            controller.handle_message(ControllerMessage::RestartDue { generation: gen, epoch: controller_pending_epoch(&controller) }, now());
        }
        controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Error("failed again".into()) }), now());
        assert_eq!(controller.state(), SessionState::Paused);
    }

    fn controller_pending_epoch(controller: &SessionController) -> u64 {
        controller.pending_restart_epoch.unwrap_or(0)
    }

    #[test]
    fn jump_to_is_idempotent() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hello world from the teleprompter".into()]);
        controller.start(&script, 0).unwrap();

        controller.jump_to(11);
        let gen_after_first = controller.generation();
        assert_eq!(controller.recognized_char_count(), 11);

        controller.jump_to(11);
        assert_eq!(controller.recognized_char_count(), 11);
        assert!(controller.generation() >= gen_after_first);
    }

    #[test]
    fn stop_then_start_returns_to_post_start_state() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).unwrap();
        controller.handle_message(
            ControllerMessage::Backend(TaggedEvent { generation: controller.generation(), event: BackendEvent::Hypothesis("hello".into()) }),
            now(),
        );
        assert_eq!(controller.recognized_char_count(), 5);

        controller.stop();
        assert_eq!(controller.state(), SessionState::Idle);

        controller.start(&script, 0).unwrap();
        assert_eq!(controller.recognized_char_count(), 0);
        assert_eq!(controller.match_start(), 0);
        assert_eq!(controller.state(), SessionState::Running);
    }

    #[test]
    fn config_change_during_suppression_window_is_ignored() {
        let rt = runtime();
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let (mut controller, _rx) = build_controller(&rt, spawn_count.clone());
        let script = Script::new(vec!["hello world".into()]);
        controller.start(&script, 0).unwrap();
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        controller.handle_message(ControllerMessage::ConfigChanged, now());
        assert_eq!(controller.state(), SessionState::Retrying);
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1, "old backend torn down, new one not spawned until restart fires");

        // A second config-change signal inside the 1.0s suppression window
        // is ignored rather than scheduling yet another restart.
        let within_window = now() + chrono::Duration::milliseconds(500);
        let generation_before = controller.generation();
        controller.handle_message(ControllerMessage::ConfigChanged, within_window);
        assert_eq!(controller.generation(), generation_before);
    }

    #[test]
    fn config_change_preserves_cursor_and_bumps_generation_once() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hello world from the teleprompter".into()]);
        controller.start(&script, 0).unwrap();
        let gen = controller.generation();
        controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Hypothesis("hello world".into()) }), now());
        assert_eq!(controller.recognized_char_count(), 11);

        controller.handle_message(ControllerMessage::ConfigChanged, now());
        assert_eq!(controller.generation(), gen + 1);
        assert_eq!(controller.recognized_char_count(), 11, "cursor preserved across device hot-swap");
        assert!(!controller.intentional_stop);
    }

    #[test]
    fn reaching_end_of_final_page_pulses_should_dismiss_once() {
        let rt = runtime();
        let (mut controller, _rx) = build_controller(&rt, Arc::new(AtomicUsize::new(0)));
        let script = Script::new(vec!["hi".into()]);
        controller.start(&script, 0).unwrap();
        let gen = controller.generation();
        controller.handle_message(ControllerMessage::Backend(TaggedEvent { generation: gen, event: BackendEvent::Hypothesis("hi".into()) }), now());

        let first = controller.snapshot();
        assert!(first.should_dismiss);
        let second = controller.snapshot();
        assert!(!second.should_dismiss, "edge trigger consumed after first read");
    }
}
