//! Wake phrase matching and energy-based speech segmentation

use super::audio::rms;

/// Energy threshold at the default sensitivity (0.5)
const BASE_ENERGY_THRESHOLD: f32 = 0.03;

/// Voiced samples needed for a segment to count (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that ends a segment (0.5s)
const SILENCE_SAMPLES: usize = 8000;

/// Longest segment or capture kept before it is cut off (30s)
pub const MAX_SEGMENT_SAMPLES: usize = 480_000;

/// Configured wake phrases, normalized to trimmed lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeWords {
    phrases: Vec<String>,
}

impl WakeWords {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// First configured phrase contained in `transcript`, case-insensitively
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<&str> {
        let normalized = transcript.to_lowercase();
        self.phrases
            .iter()
            .find(|p| normalized.contains(p.as_str()))
            .map(String::as_str)
    }

    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.find(transcript).is_some()
    }

    /// Text following the wake phrase, or the whole transcript if none is present
    #[must_use]
    pub fn extract_command(&self, transcript: &str) -> String {
        // Lowercasing can change a char's byte length, so map each original
        // char boundary to its offset in the lowercased text.
        let mut lower = String::with_capacity(transcript.len());
        let mut bounds = Vec::with_capacity(transcript.len());
        for (offset, c) in transcript.char_indices() {
            bounds.push((lower.len(), offset));
            lower.extend(c.to_lowercase());
        }

        self.phrases
            .iter()
            .find_map(|p| lower.find(p.as_str()).map(|pos| pos + p.len()))
            .map(|end| {
                bounds
                    .iter()
                    .find(|(lowered, _)| *lowered >= end)
                    .map_or(transcript.len(), |(_, original)| *original)
            })
            .and_then(|end| transcript.get(end..))
            .map_or_else(
                || transcript.trim().to_string(),
                |rest| {
                    rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
                        .trim_end()
                        .to_string()
                },
            )
    }
}

/// Splits a stream of frames into utterances using RMS energy
///
/// A segment completes after enough voiced audio followed by trailing
/// silence; twice that silence without enough speech discards the buffer.
/// Audio that never falls silent is cut off at [`MAX_SEGMENT_SAMPLES`].
#[derive(Debug, Clone)]
pub struct SpeechSegmenter {
    threshold: f32,
    buffer: Vec<f32>,
    voiced: usize,
    silence: usize,
    active: bool,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl SpeechSegmenter {
    /// Higher sensitivity lowers the energy threshold
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        Self {
            threshold: threshold_for(sensitivity),
            buffer: Vec::new(),
            voiced: 0,
            silence: 0,
            active: false,
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether a segment is currently being accumulated
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn is_voiced(&self, frame: &[f32]) -> bool {
        rms(frame) > self.threshold
    }

    /// Feed one frame, returning a finished segment if this frame completed one
    pub fn push(&mut self, frame: &[f32]) -> Option<Vec<f32>> {
        let voiced = self.is_voiced(frame);

        if !self.active {
            if voiced {
                self.active = true;
                self.buffer.extend_from_slice(frame);
                self.voiced = frame.len();
                self.silence = 0;
                tracing::trace!(threshold = self.threshold, "speech started");
            }
            return None;
        }

        self.buffer.extend_from_slice(frame);
        if voiced {
            self.voiced += frame.len();
            self.silence = 0;
        } else {
            self.silence += frame.len();
        }

        if self.silence > SILENCE_SAMPLES && self.voiced > MIN_SPEECH_SAMPLES {
            tracing::debug!(samples = self.buffer.len(), "speech segment complete");
            let segment = std::mem::take(&mut self.buffer);
            self.reset();
            return Some(segment);
        }

        if self.buffer.len() >= MAX_SEGMENT_SAMPLES {
            tracing::debug!(samples = self.buffer.len(), "speech segment hit length cap");
            let segment = (self.voiced > MIN_SPEECH_SAMPLES).then(|| {
                let mut segment = std::mem::take(&mut self.buffer);
                segment.truncate(MAX_SEGMENT_SAMPLES);
                segment
            });
            self.reset();
            return segment;
        }

        if self.silence > SILENCE_SAMPLES * 2 {
            tracing::trace!("not enough speech, resetting");
            self.reset();
        }

        None
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.voiced = 0;
        self.silence = 0;
        self.active = false;
    }
}

fn threshold_for(sensitivity: f32) -> f32 {
    BASE_ENERGY_THRESHOLD * (1.5 - sensitivity.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 1600;

    fn frames(value: f32, count: usize) -> Vec<Vec<f32>> {
        vec![vec![value; FRAME]; count]
    }

    #[test]
    fn matching_is_case_insensitive() {
        let wake = WakeWords::new(["  Hey Cadence "]);
        assert_eq!(wake.phrases(), ["hey cadence"]);
        assert!(wake.matches("HEY CADENCE, lights on"));
        assert!(!wake.matches("hello world"));
    }

    #[test]
    fn extracts_command_after_phrase() {
        let wake = WakeWords::new(["hey cadence"]);
        assert_eq!(wake.extract_command("Hey Cadence, what's the weather?"), "what's the weather?");
        assert_eq!(wake.extract_command("Hey Cadence"), "");
        assert_eq!(wake.extract_command("turn it off "), "turn it off");
    }

    #[test]
    fn command_extraction_survives_case_folding_width_changes() {
        let wake = WakeWords::new(["hey cadence"]);
        assert_eq!(wake.extract_command("İİ hey cadence, lights on"), "lights on");
        assert_eq!(wake.extract_command("HEY CADENCE İstanbul time"), "İstanbul time");
    }

    #[test]
    fn sensitivity_scales_threshold() {
        assert!((SpeechSegmenter::new(0.5).threshold() - 0.03).abs() < 1e-6);
        assert!(SpeechSegmenter::new(1.0).threshold() < SpeechSegmenter::new(0.0).threshold());
    }

    #[test]
    fn speech_then_silence_completes_segment() {
        let mut seg = SpeechSegmenter::default();
        let mut done = None;
        for frame in frames(0.2, 4).iter().chain(frames(0.0, 6).iter()) {
            if let Some(segment) = seg.push(frame) {
                done = Some(segment);
            }
        }
        let segment = done.unwrap();
        assert_eq!(segment.len(), FRAME * 10);
        assert!(!seg.is_active());
    }

    #[test]
    fn continuous_speech_is_cut_at_cap() {
        let mut seg = SpeechSegmenter::default();
        let mut segments = Vec::new();
        for frame in frames(0.2, 600) {
            if let Some(segment) = seg.push(&frame) {
                segments.push(segment.len());
            }
            assert!(seg.buffer.len() < MAX_SEGMENT_SAMPLES);
        }

        assert_eq!(segments, vec![MAX_SEGMENT_SAMPLES; 2]);
    }

    #[test]
    fn short_blip_is_discarded() {
        let mut seg = SpeechSegmenter::default();
        for frame in frames(0.2, 1).iter().chain(frames(0.0, 12).iter()) {
            assert!(seg.push(frame).is_none());
        }
        assert!(!seg.is_active());
    }
}
