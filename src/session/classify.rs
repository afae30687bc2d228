// Window classification seam
//
// The controller treats classification as one blocking call per window. The
// trait keeps real models pluggable; `EpochFeatureClassifier` is the
// built-in implementation, which re-segments the window into fixed-length
// feature epochs and maps the aggregate feature to an activity label.

use crate::session::types::EegSample;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("window of {got} samples cannot fill one {needed}-sample epoch")]
    TooFewSamples { needed: usize, got: usize },

    #[error("classifier fault: {0}")]
    Internal(String),
}

/// Maps a window of samples to a single label.
///
/// A failure aborts only the window that raised it; the session continues.
pub trait WindowClassifier: Send + Sync {
    fn classify(&self, window: &[EegSample]) -> Result<String, ClassifyError>;
}

/// Epoch segmentation and label thresholds for the built-in classifier
#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Samples per feature epoch
    pub epoch_len: usize,
    /// Samples to advance between consecutive epochs
    pub epoch_step: usize,
    /// Mean absolute amplitude below which a window is `low_activity`
    pub low_threshold: f32,
    /// Mean absolute amplitude above which a window is `high_activity`
    pub high_threshold: f32,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            epoch_len: 15,
            epoch_step: 5,
            low_threshold: 100.0,
            high_threshold: 500.0,
        }
    }
}

/// Built-in classifier: per-epoch mean absolute amplitude, averaged across
/// epochs, thresholded into three labels.
pub struct EpochFeatureClassifier {
    config: EpochConfig,
}

impl EpochFeatureClassifier {
    pub fn new(config: EpochConfig) -> Self {
        Self { config }
    }

    fn label_for(&self, feature: f32) -> &'static str {
        if feature < self.config.low_threshold {
            "low_activity"
        } else if feature <= self.config.high_threshold {
            "moderate_activity"
        } else {
            "high_activity"
        }
    }
}

impl WindowClassifier for EpochFeatureClassifier {
    fn classify(&self, window: &[EegSample]) -> Result<String, ClassifyError> {
        let epoch_len = self.config.epoch_len;
        if window.len() < epoch_len {
            return Err(ClassifyError::TooFewSamples {
                needed: epoch_len,
                got: window.len(),
            });
        }

        let mut features = Vec::new();
        let mut start = 0;
        while start + epoch_len <= window.len() {
            features.push(mean_abs_amplitude(&window[start..start + epoch_len])?);
            start += self.config.epoch_step.max(1);
        }

        let feature = features.iter().sum::<f32>() / features.len() as f32;
        Ok(self.label_for(feature).to_string())
    }
}

fn mean_abs_amplitude(epoch: &[EegSample]) -> Result<f32, ClassifyError> {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for sample in epoch {
        for value in &sample.channels {
            sum += value.abs();
            count += 1;
        }
    }
    if count == 0 {
        return Err(ClassifyError::Internal(
            "window contains no channel data".to_string(),
        ));
    }
    Ok(sum / count as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn window_of(value: f32, len: usize) -> Vec<EegSample> {
        (0..len)
            .map(|_| EegSample {
                captured_at: Utc::now(),
                channels: vec![value; 5],
            })
            .collect()
    }

    #[test]
    fn short_window_fails() {
        let classifier = EpochFeatureClassifier::new(EpochConfig::default());
        let result = classifier.classify(&window_of(10.0, 10));
        assert_eq!(
            result,
            Err(ClassifyError::TooFewSamples { needed: 15, got: 10 })
        );
    }

    #[test]
    fn amplitude_maps_to_labels() {
        let classifier = EpochFeatureClassifier::new(EpochConfig::default());
        assert_eq!(classifier.classify(&window_of(10.0, 30)).unwrap(), "low_activity");
        assert_eq!(
            classifier.classify(&window_of(250.0, 30)).unwrap(),
            "moderate_activity"
        );
        assert_eq!(
            classifier.classify(&window_of(900.0, 30)).unwrap(),
            "high_activity"
        );
    }

    #[test]
    fn amplitude_uses_absolute_values() {
        let classifier = EpochFeatureClassifier::new(EpochConfig::default());
        assert_eq!(
            classifier.classify(&window_of(-900.0, 30)).unwrap(),
            "high_activity"
        );
    }
}
