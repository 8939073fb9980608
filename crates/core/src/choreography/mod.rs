use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{RenderError, Result};

/// Scripted sequence of parameter changes that drives the visualiser.
///
/// The value is immutable once loaded and is handed to the render surface
/// exactly as it was read. Fields the document leaves out stay absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choreography {
    pub sequences: Vec<Sequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_params: Option<Map<String, Value>>,
    /// Advisory only; the frame count comes from the probed audio duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Number>,
}

/// One timed parameter-change instruction, kept as the raw JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(pub Map<String, Value>);

/// Keys a sequence may carry its start time under.
const START_KEYS: [&str; 3] = ["time", "startTime", "start"];

impl Sequence {
    /// Start time in seconds, read from the first time key present.
    pub fn start_time(&self) -> Option<f64> {
        START_KEYS
            .iter()
            .find_map(|key| self.0.get(*key))
            .and_then(Value::as_f64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl Choreography {
    /// Reads and validates a choreography document.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RenderError::InputNotFound {
                kind: "choreography",
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Advisory duration in seconds, when the document states one.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.as_ref().and_then(Number::as_f64)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let choreography: Self = serde_json::from_str(text)
            .map_err(|err| RenderError::InvalidChoreography(err.to_string()))?;
        choreography.validate();
        Ok(choreography)
    }

    /// Warns about timing the visualiser is likely to misread. Nothing here
    /// rejects the document; the surface interprets the sequences.
    pub fn validate(&self) {
        if let Some(duration) = self.duration_seconds() {
            if !duration.is_finite() || duration < 0.0 {
                tracing::warn!(duration, "choreography duration is not a usable length");
            }
        }

        let mut previous: Option<f64> = None;
        for (index, sequence) in self.sequences.iter().enumerate() {
            let Some(time) = sequence.start_time() else {
                tracing::warn!(index, "sequence has no numeric start time");
                continue;
            };
            if !time.is_finite() || time < 0.0 {
                tracing::warn!(index, time, "sequence start time is negative");
            }
            if let Some(prev) = previous.filter(|prev| time < *prev) {
                tracing::warn!(
                    index,
                    time,
                    previous = prev,
                    "sequence starts before the one preceding it"
                );
            }
            previous = Some(time);
        }
    }

    /// Logs a note when the advisory duration disagrees with the audio.
    pub fn check_against_audio(&self, audio_seconds: f64) {
        if let Some(duration) = self.duration_seconds() {
            if (duration - audio_seconds).abs() > 0.5 {
                tracing::info!(
                    choreography = duration,
                    audio = audio_seconds,
                    "choreography duration differs from audio; using audio duration"
                );
            }
        }
    }
}
