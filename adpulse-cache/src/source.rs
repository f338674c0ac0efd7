//! Provenance classification.
//!
//! Independent of age: a value read from the durable store is classified
//! by where it came from, not by how old it is.

use adpulse_core::{IndicatorColor, SourceCategory, SourceTag};

/// Display annotation for a [`SourceTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceReport {
    pub category: SourceCategory,
    pub color: IndicatorColor,
    pub label: &'static str,
}

/// Total mapping from tag to category, color and label.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceClassifier;

impl SourceClassifier {
    pub fn classify(tag: SourceTag) -> SourceReport {
        let (category, color) = match tag {
            SourceTag::FreshCache | SourceTag::LiveApi => {
                (SourceCategory::FreshData, IndicatorColor::Green)
            }
            SourceTag::StaleCache | SourceTag::ForcedRefresh => {
                (SourceCategory::StaleData, IndicatorColor::Amber)
            }
            SourceTag::Database => (SourceCategory::DurableStore, IndicatorColor::Blue),
            SourceTag::Placeholder | SourceTag::Unknown => {
                (SourceCategory::Unknown, IndicatorColor::Gray)
            }
        };
        SourceReport {
            category,
            color,
            label: category.label(),
        }
    }

    /// Classify a raw provenance label. Unrecognised labels are `Unknown`.
    pub fn classify_label(label: &str) -> SourceReport {
        Self::classify(SourceTag::from_label(label))
    }
}
