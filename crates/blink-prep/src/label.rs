use std::fmt;

use serde::Serialize;

use crate::error::PrepError;

/// Binary eye-state label.
///
/// Encoded as `0` for [`Label::Open`] and `1` for [`Label::Closed`], both in
/// input files and in serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum Label {
    /// Eyes open (encoded `0`).
    Open,
    /// Eyes closed (encoded `1`).
    Closed,
}

impl Label {
    /// Both labels in encoding order.
    pub const ALL: [Label; 2] = [Label::Open, Label::Closed];

    /// Parse a raw encoded label.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidLabel`] for anything other than `0` or `1`.
    pub fn from_value(value: u64) -> Result<Self, PrepError> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Closed),
            _ => Err(PrepError::InvalidLabel { value }),
        }
    }

    /// Return the zero-based encoding (`0` or `1`).
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        label.index() as u8
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Open => "0",
            Self::Closed => "1",
        })
    }
}

/// Number of records carrying each label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    /// Records labeled [`Label::Open`].
    pub open: usize,
    /// Records labeled [`Label::Closed`].
    pub closed: usize,
}

impl LabelCounts {
    /// Count the labels in `labels`.
    #[must_use]
    pub fn from_labels(labels: &[Label]) -> Self {
        labels.iter().fold(Self::default(), |mut counts, label| {
            match label {
                Label::Open => counts.open += 1,
                Label::Closed => counts.closed += 1,
            }
            counts
        })
    }

    /// Return the count for one label.
    #[must_use]
    pub fn get(&self, label: Label) -> usize {
        match label {
            Label::Open => self.open,
            Label::Closed => self.closed,
        }
    }

    /// Return the total number of labels counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.open + self.closed
    }
}
