// Classifier - content classification of aggregated audio statistics
//
// Two independent strategies share one interface:
//
// Rules: a five-way, priority-ordered, first-match decision list
//        (silence, speech, music, noise, then unknown).
// Vote:  a two-class scorer (music vs. speech) that accumulates weighted
//        votes over three binary feature thresholds. Used for live
//        per-frame streaming.
//
// Threshold constants are fixed. Label assignment downstream depends on
// their exact values, so they are not part of AppConfig.

use serde::{Deserialize, Serialize};

use super::aggregator::WindowStats;
use super::features::FeatureFrame;

/// Content category assigned to a window of audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLabel {
    Speech,
    Music,
    Noise,
    Silence,
    /// No rule matched
    Unknown,
}

impl ContentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentLabel::Speech => "speech",
            ContentLabel::Music => "music",
            ContentLabel::Noise => "noise",
            ContentLabel::Silence => "silence",
            ContentLabel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classification strategy is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    /// Five-way priority rule list over window statistics
    #[default]
    Rules,
    /// Two-class music/speech vote, run on every frame
    Vote,
}

/// Common interface for classification strategies
pub trait Classify {
    /// Map statistics to a label and a confidence in [0, 1]
    fn classify(&self, stats: &WindowStats) -> (ContentLabel, f32);

    fn mode(&self) -> ClassificationMode;
}

// ============================================================================
// Rule list
// ============================================================================

pub const SILENCE_RMS: f32 = 0.01;
pub const SPEECH_CENTROID_MIN: f32 = 1000.0;
pub const SPEECH_CENTROID_MAX: f32 = 3000.0;
pub const SPEECH_ZCR_MIN: f32 = 0.1;
pub const SPEECH_MFCC_STD_MIN: f32 = 5.0;
pub const MUSIC_CENTROID_MIN: f32 = 2000.0;
pub const MUSIC_RMS_MIN: f32 = 0.1;
pub const MUSIC_MFCC_STD_MIN: f32 = 3.0;
pub const MUSIC_MFCC_STD_MAX: f32 = 8.0;
pub const NOISE_MFCC_STD_MAX: f32 = 3.0;
pub const NOISE_RMS_MAX: f32 = 0.05;
pub const NOISE_CENTROID_MAX: f32 = 1000.0;

/// Confidence reported when no rule matches
pub const UNKNOWN_CONFIDENCE: f32 = 0.5;

/// One entry of the decision list
#[derive(Clone, Copy)]
pub struct Rule {
    /// Lower is evaluated first
    pub priority: u8,
    pub label: ContentLabel,
    pub confidence: f32,
    pub predicate: fn(&WindowStats) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("priority", &self.priority)
            .field("label", &self.label)
            .field("confidence", &self.confidence)
            .finish()
    }
}

fn is_silence(s: &WindowStats) -> bool {
    s.mean_rms < SILENCE_RMS
}

fn is_speech(s: &WindowStats) -> bool {
    s.mean_spectral_centroid > SPEECH_CENTROID_MIN
        && s.mean_spectral_centroid < SPEECH_CENTROID_MAX
        && s.mean_zcr > SPEECH_ZCR_MIN
        && s.mfcc_std_dev > SPEECH_MFCC_STD_MIN
}

fn is_music(s: &WindowStats) -> bool {
    s.mean_spectral_centroid > MUSIC_CENTROID_MIN
        && s.mean_rms > MUSIC_RMS_MIN
        && s.mfcc_std_dev > MUSIC_MFCC_STD_MIN
        && s.mfcc_std_dev < MUSIC_MFCC_STD_MAX
}

fn is_noise(s: &WindowStats) -> bool {
    s.mfcc_std_dev < NOISE_MFCC_STD_MAX
        || (s.mean_rms < NOISE_RMS_MAX && s.mean_spectral_centroid < NOISE_CENTROID_MAX)
}

/// The decision list, already in priority order
pub const DEFAULT_RULES: [Rule; 4] = [
    Rule {
        priority: 1,
        label: ContentLabel::Silence,
        confidence: 0.9,
        predicate: is_silence,
    },
    Rule {
        priority: 2,
        label: ContentLabel::Speech,
        confidence: 0.8,
        predicate: is_speech,
    },
    Rule {
        priority: 3,
        label: ContentLabel::Music,
        confidence: 0.75,
        predicate: is_music,
    },
    Rule {
        priority: 4,
        label: ContentLabel::Noise,
        confidence: 0.7,
        predicate: is_noise,
    },
];

/// First-match decision list over window statistics
///
/// State-free: identical statistics always give the identical label and
/// confidence.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    rules: Vec<Rule>,
}

impl RuleClassifier {
    pub fn new() -> Self {
        let mut rules = DEFAULT_RULES.to_vec();
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classify for RuleClassifier {
    fn classify(&self, stats: &WindowStats) -> (ContentLabel, f32) {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(stats))
            .map(|rule| (rule.label, rule.confidence))
            .unwrap_or((ContentLabel::Unknown, UNKNOWN_CONFIDENCE))
    }

    fn mode(&self) -> ClassificationMode {
        ClassificationMode::Rules
    }
}

// ============================================================================
// Two-class vote
// ============================================================================

pub const VOTE_CENTROID_THRESHOLD: f32 = 2000.0;
pub const VOTE_FLATNESS_THRESHOLD: f32 = 0.3;
pub const VOTE_ZCR_THRESHOLD: f32 = 0.1;

/// Music vs. speech scorer
///
/// Each threshold casts a weighted vote for one hypothesis:
/// - centroid > 2000 Hz: music +0.4, otherwise speech +0.3
/// - flatness > 0.3: music +0.3, otherwise speech +0.4
/// - zcr > 0.1: speech +0.3, otherwise music +0.3
///
/// Confidence is the winner's share of all votes cast. Ties go to speech.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoteClassifier;

impl VoteClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Raw (music, speech) vote totals
    pub fn votes(&self, stats: &WindowStats) -> (f32, f32) {
        let mut music = 0.0f32;
        let mut speech = 0.0f32;

        if stats.mean_spectral_centroid > VOTE_CENTROID_THRESHOLD {
            music += 0.4;
        } else {
            speech += 0.3;
        }

        if stats.mean_spectral_flatness > VOTE_FLATNESS_THRESHOLD {
            music += 0.3;
        } else {
            speech += 0.4;
        }

        if stats.mean_zcr > VOTE_ZCR_THRESHOLD {
            speech += 0.3;
        } else {
            music += 0.3;
        }

        (music, speech)
    }

    /// Classify a single frame (live streaming use)
    pub fn classify_frame(&self, frame: &FeatureFrame) -> (ContentLabel, f32) {
        self.classify(&WindowStats::from(frame))
    }
}

impl Classify for VoteClassifier {
    fn classify(&self, stats: &WindowStats) -> (ContentLabel, f32) {
        let (music, speech) = self.votes(stats);
        let total = music + speech;
        if music > speech {
            (ContentLabel::Music, (music / total).clamp(0.0, 1.0))
        } else {
            (ContentLabel::Speech, (speech / total).clamp(0.0, 1.0))
        }
    }

    fn mode(&self) -> ClassificationMode {
        ClassificationMode::Vote
    }
}

impl From<&FeatureFrame> for WindowStats {
    fn from(frame: &FeatureFrame) -> Self {
        WindowStats {
            mean_rms: frame.rms,
            mean_energy: frame.energy,
            mean_spectral_centroid: frame.spectral_centroid,
            mean_spectral_flatness: frame.spectral_flatness,
            mean_zcr: frame.zcr,
            mfcc_std_dev: 0.0,
            frame_count: 1,
        }
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Classifier dispatching to the strategy selected by `ClassificationMode`
#[derive(Debug, Clone)]
pub struct Classifier {
    mode: ClassificationMode,
    rules: RuleClassifier,
    vote: VoteClassifier,
}

impl Classifier {
    pub fn new(mode: ClassificationMode) -> Self {
        Self {
            mode,
            rules: RuleClassifier::new(),
            vote: VoteClassifier::new(),
        }
    }

    pub fn set_mode(&mut self, mode: ClassificationMode) {
        if self.mode != mode {
            log::info!("[Classifier] Switching mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    pub fn rules(&self) -> &RuleClassifier {
        &self.rules
    }

    pub fn vote(&self) -> &VoteClassifier {
        &self.vote
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassificationMode::default())
    }
}

impl Classify for Classifier {
    fn classify(&self, stats: &WindowStats) -> (ContentLabel, f32) {
        match self.mode {
            ClassificationMode::Rules => self.rules.classify(stats),
            ClassificationMode::Vote => self.vote.classify(stats),
        }
    }

    fn mode(&self) -> ClassificationMode {
        self.mode
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
