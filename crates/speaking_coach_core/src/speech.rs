//! crates/speaking_coach_core/src/speech.rs
//!
//! Drives a platform speech engine for either script variant.
//!
//! The controller keeps one shared "currently speaking" flag: starting a new
//! utterance always stops the current one first, so at most one plays at a time.
//! Engines report the end of an utterance through the `CompletionHandle` they
//! receive with it; a completion for anything but the current utterance is ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

/// Name fragments that platforms use for their better-sounding voices.
const QUALITY_MARKERS: [&str; 5] = ["natural", "neural", "premium", "enhanced", "hd"];

//=========================================================================================
// Voices & Utterances
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Identifier the engine understands.
    pub id: String,
    /// Descriptive name, e.g. "Microsoft Aria Online (Natural)".
    pub name: String,
    /// BCP 47 tag, e.g. "en-GB".
    pub locale: String,
}

impl Voice {
    pub fn is_english(&self) -> bool {
        self.locale
            .split(['-', '_'])
            .next()
            .is_some_and(|lang| lang.eq_ignore_ascii_case("en"))
    }

    pub fn is_high_quality(&self) -> bool {
        let name = self.name.to_lowercase();
        QUALITY_MARKERS.iter().any(|marker| name.contains(marker))
    }
}

/// Picks an English voice, preferring one whose name signals higher quality.
pub fn select_voice(voices: &[Voice]) -> Option<Voice> {
    voices
        .iter()
        .find(|v| v.is_english() && v.is_high_quality())
        .or_else(|| voices.iter().find(|v| v.is_english()))
        .cloned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(u64);

impl UtteranceId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Signals the controller that an utterance finished playing.
#[derive(Clone)]
pub struct CompletionHandle {
    id: UtteranceId,
    state: Weak<Mutex<PlaybackState>>,
}

impl CompletionHandle {
    pub fn complete(&self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = lock(&state);
            if state.current == Some(self.id) {
                state.current = None;
                debug!(utterance = self.id.0, "Utterance completed.");
            }
        }
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle").field("id", &self.id).finish()
    }
}

/// Everything an engine needs to play one piece of text.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub voice: Voice,
    pub rate: f32,
    pub completion: CompletionHandle,
}

//=========================================================================================
// Engine Port
//=========================================================================================

/// The platform speech service.
pub trait SpeechEngine: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Starts playing. The engine calls `utterance.completion.complete()` when done.
    fn speak(&self, utterance: Utterance);

    /// Cancels whatever is playing, immediately.
    fn cancel(&self);
}

//=========================================================================================
// Controller
//=========================================================================================

#[derive(Debug, Default)]
struct PlaybackState {
    current: Option<UtteranceId>,
    next_id: u64,
}

fn lock(state: &Mutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Constructed once per speech channel and passed down explicitly.
/// Dropping it stops any playback it started.
pub struct SpeechPlaybackController {
    engine: Arc<dyn SpeechEngine>,
    state: Arc<Mutex<PlaybackState>>,
    rate: f32,
}

impl SpeechPlaybackController {
    pub const DEFAULT_RATE: f32 = 0.9;

    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(PlaybackState::default())),
            rate: Self::DEFAULT_RATE,
        }
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn is_speaking(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    pub fn current(&self) -> Option<UtteranceId> {
        lock(&self.state).current
    }

    /// Speaks `text`, replacing anything already playing.
    ///
    /// Returns `None` without touching playback when the text is blank or no
    /// English voice is available.
    pub fn speak(&self, text: &str) -> Option<UtteranceId> {
        if text.trim().is_empty() {
            debug!("Nothing to speak.");
            return None;
        }
        let Some(voice) = select_voice(&self.engine.voices()) else {
            debug!("No English voice available; skipping playback.");
            return None;
        };

        self.stop();

        let id = {
            let mut state = lock(&self.state);
            state.next_id += 1;
            let id = UtteranceId(state.next_id);
            state.current = Some(id);
            id
        };
        debug!(utterance = id.0, voice = %voice.name, "Starting utterance.");
        self.engine.speak(Utterance {
            id,
            text: text.to_string(),
            voice,
            rate: self.rate,
            completion: CompletionHandle {
                id,
                state: Arc::downgrade(&self.state),
            },
        });
        Some(id)
    }

    /// Stops playback if something is speaking, otherwise speaks `text`.
    pub fn toggle(&self, text: &str) -> Option<UtteranceId> {
        if self.is_speaking() {
            self.stop();
            None
        } else {
            self.speak(text)
        }
    }

    /// Clears the speaking flag and cancels the engine's playback.
    pub fn stop(&self) {
        // The engine may complete synchronously on cancel, so the lock is released first.
        let stopped = lock(&self.state).current.take();
        if let Some(id) = stopped {
            debug!(utterance = id.0, "Stopping utterance.");
            self.engine.cancel();
        }
    }
}

impl Drop for SpeechPlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeEngine {
        voices: Vec<Voice>,
        playing: Mutex<Vec<Utterance>>,
        cancels: Mutex<usize>,
    }

    impl FakeEngine {
        fn with_voices(voices: Vec<Voice>) -> Arc<Self> {
            Arc::new(Self {
                voices,
                ..Default::default()
            })
        }

        fn active(&self) -> Vec<Utterance> {
            self.playing.lock().unwrap().clone()
        }
    }

    impl SpeechEngine for FakeEngine {
        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        fn speak(&self, utterance: Utterance) {
            self.playing.lock().unwrap().push(utterance);
        }

        fn cancel(&self) {
            *self.cancels.lock().unwrap() += 1;
            self.playing.lock().unwrap().clear();
        }
    }

    fn voice(name: &str, locale: &str) -> Voice {
        Voice {
            id: name.to_lowercase(),
            name: name.to_string(),
            locale: locale.to_string(),
        }
    }

    #[test]
    fn prefers_a_high_quality_english_voice() {
        let voices = vec![
            voice("Ting-Ting", "zh-CN"),
            voice("Daniel", "en-GB"),
            voice("Aria Online (Natural)", "en-US"),
        ];
        assert_eq!(select_voice(&voices).unwrap().name, "Aria Online (Natural)");
    }

    #[test]
    fn falls_back_to_any_english_voice() {
        let voices = vec![voice("Natural Mandarin", "zh-CN"), voice("Daniel", "en_GB")];
        assert_eq!(select_voice(&voices).unwrap().name, "Daniel");
        assert_eq!(select_voice(&[voice("Amélie", "fr-CA")]), None);
    }

    #[test]
    fn speaking_twice_leaves_only_the_second_utterance() {
        let engine = FakeEngine::with_voices(vec![voice("Daniel", "en-GB")]);
        let controller = SpeechPlaybackController::new(engine.clone());

        controller.speak("AI script").unwrap();
        let second = controller.speak("Personal script").unwrap();

        let active = engine.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].text, "Personal script");
        assert_eq!(active[0].rate, SpeechPlaybackController::DEFAULT_RATE);
        assert_eq!(controller.current(), Some(second));
        assert_eq!(*engine.cancels.lock().unwrap(), 1);
    }

    #[test]
    fn completion_clears_the_flag_but_stale_completions_do_not() {
        let engine = FakeEngine::with_voices(vec![voice("Daniel", "en-GB")]);
        let controller = SpeechPlaybackController::new(engine.clone());

        controller.speak("first").unwrap();
        let stale = engine.active()[0].completion.clone();
        controller.speak("second").unwrap();
        stale.complete();
        assert!(controller.is_speaking());

        engine.active()[0].completion.complete();
        assert!(!controller.is_speaking());
    }

    #[test]
    fn stop_cancels_playback_immediately() {
        let engine = FakeEngine::with_voices(vec![voice("Daniel", "en-GB")]);
        let controller = SpeechPlaybackController::new(engine.clone());

        controller.speak("text").unwrap();
        controller.stop();

        assert!(!controller.is_speaking());
        assert!(engine.active().is_empty());
    }

    #[test]
    fn no_english_voice_is_a_no_op() {
        let engine = FakeEngine::with_voices(vec![voice("Amélie", "fr-FR")]);
        let controller = SpeechPlaybackController::new(engine.clone());

        assert_eq!(controller.speak("hello"), None);
        assert_eq!(controller.speak("   "), None);
        assert!(engine.active().is_empty());
        assert!(!controller.is_speaking());
    }

    #[test]
    fn toggle_stops_when_already_speaking() {
        let engine = FakeEngine::with_voices(vec![voice("Daniel", "en-GB")]);
        let controller = SpeechPlaybackController::new(engine.clone()).with_rate(1.0);

        assert!(controller.toggle("text").is_some());
        assert_eq!(controller.toggle("text"), None);
        assert!(!controller.is_speaking());
        assert!(engine.active().is_empty());
    }
}
