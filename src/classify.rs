use crate::color::{lch_ramp, ColorError};
use crate::types::{match_value, property_value, Dataset};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no values to classify")]
    EmptySample,
    #[error("bucket count must be at least 2, got {0}")]
    InvalidBuckets(usize),
    #[error(transparent)]
    Palette(#[from] ColorError),
}

/// Application-level fallbacks used when a dataset file carries no
/// presentation config of its own.
#[derive(Debug, Clone)]
pub struct ClassifyDefaults {
    pub palette: [String; 2],
    pub buckets: usize,
    pub no_data_color: String,
}

/// Quantile classification of one numeric property: ascending break values
/// (one fewer than the bucket count), the bucket color ramp, and the color
/// standing in for zero/unmatched units.
#[derive(Debug, Clone)]
pub struct Classification {
    pub breaks: Vec<f64>,
    pub colors: Vec<String>,
    pub no_data_color: String,
}

/// Where a single value lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Zero or missing: treated as absence of signal, not a magnitude.
    NoData,
    /// Index into the color ramp.
    Bucket(usize),
    /// Above every breakpoint; the rendering expression's trailing default
    /// applies.
    Overflow,
}

/// Interior quantile breakpoints at p = i/buckets using the linear
/// interpolation method over the sorted sample.
pub fn quantile_breaks(sample: &[f64], buckets: usize) -> Result<Vec<f64>, ClassifyError> {
    if sample.is_empty() {
        return Err(ClassifyError::EmptySample);
    }
    if buckets < 2 {
        return Err(ClassifyError::InvalidBuckets(buckets));
    }

    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let breaks = (1..buckets)
        .map(|i| {
            let p = i as f64 / buckets as f64;
            let h = p * (n - 1) as f64;
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        })
        .collect();
    Ok(breaks)
}

/// Classify `property` across the dataset. Presentation settings in the file
/// win over the application defaults.
pub fn classify(
    dataset: &Dataset,
    property: &str,
    defaults: &ClassifyDefaults,
) -> Result<Classification, ClassifyError> {
    let sample = dataset.sample(property);
    if sample.is_empty() {
        return Err(ClassifyError::EmptySample);
    }

    let buckets = dataset.presentation.buckets.unwrap_or(defaults.buckets);
    let palette = dataset
        .presentation
        .palette
        .clone()
        .unwrap_or_else(|| defaults.palette.clone());

    Ok(Classification {
        breaks: quantile_breaks(&sample, buckets)?,
        colors: lch_ramp(&palette[0], &palette[1], buckets)?,
        no_data_color: defaults.no_data_color.clone(),
    })
}

impl Classification {
    /// First breakpoint at or above the value wins; zero always reads as
    /// no-data regardless of where the breakpoints sit.
    pub fn assign(&self, value: Option<f64>) -> Assignment {
        let Some(value) = value else {
            return Assignment::NoData;
        };
        if value == 0.0 {
            return Assignment::NoData;
        }
        for (i, brk) in self.breaks.iter().enumerate() {
            if value <= *brk {
                return Assignment::Bucket(i);
            }
        }
        Assignment::Overflow
    }

    pub fn color_for(&self, value: Option<f64>) -> Option<&str> {
        match self.assign(value) {
            Assignment::Bucket(i) => self.colors.get(i).map(String::as_str),
            Assignment::NoData | Assignment::Overflow => None,
        }
    }

    /// Ordered (match key -> color) pairs for the rendering expression. Units
    /// that classify as no-data or overflow are omitted and pick up the
    /// trailing default color instead.
    pub fn match_table(&self, dataset: &Dataset, match_key: &str, property: &str) -> Vec<(String, String)> {
        let mut table = Vec::new();
        for feature in &dataset.features {
            let Some(key) = match_value(feature, match_key) else {
                continue;
            };
            if let Some(color) = self.color_for(property_value(feature, property)) {
                table.push((key, color.to_string()));
            }
        }
        table
    }
}

/// Legend label for a breakpoint. Fractional values below 0.1 and whole
/// values wider than 10 digits switch to scientific notation; the digit-count
/// threshold intentionally differs between the two because the domain mixes
/// small rates with large raw counts.
pub fn format_break_label(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let int_digits = format!("{}", value.abs().trunc()).len();
    if int_digits > 10 {
        if value.fract() == 0.0 {
            format!("{value:.4e}")
        } else {
            format!("{value:.2e}")
        }
    } else if value.abs() < 0.1 {
        format!("{value:.2e}")
    } else {
        format!("{value:.2}")
    }
}
