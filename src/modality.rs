use std::collections::BTreeMap;
use std::fmt;

/// Label table written to every dataset manifest. Binary segmentation only.
pub const LABELS: [(&str, &str); 2] = [("0", "background"), ("1", "lesion")];

/// MRI acquisition types and the lesion annotation. All modalities of a case share the same space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    Flair,
    T1,
    T2,
    Mask,
}

/// Input channels in the order consumed by the downstream model
pub const CHANNELS: [Modality; 3] = [Modality::Flair, Modality::T1, Modality::T2];

impl Modality {
    pub const ALL: [Modality; 4] = [Modality::Flair, Modality::T1, Modality::T2, Modality::Mask];

    /// The modality every case must have
    pub const PRIMARY: Modality = Modality::Flair;

    pub fn name(&self) -> &'static str {
        match self {
            Modality::Flair => "FLAIR",
            Modality::T1 => "T1",
            Modality::T2 => "T2",
            Modality::Mask => "MASK",
        }
    }

    /// Channel index of an image modality, `None` for the label
    pub fn channel_index(&self) -> Option<usize> {
        match self {
            Modality::Flair => Some(0),
            Modality::T1 => Some(1),
            Modality::T2 => Some(2),
            Modality::Mask => None,
        }
    }

    pub fn from_channel_index(index: usize) -> Option<Self> {
        CHANNELS.get(index).copied()
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Modality::Mask)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Channel-name table keyed by stringified channel index, e.g. `{"0": "FLAIR"}`
pub fn channel_names() -> BTreeMap<String, String> {
    CHANNELS
        .iter()
        .filter_map(|m| m.channel_index().map(|i| (i.to_string(), m.name().to_string())))
        .collect()
}

pub fn label_names() -> BTreeMap<String, String> {
    LABELS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// How modality files are named on disk.
///
/// - `Source`: `P1_T1_FLAIR.nii.gz`, `P1_T1_MASK.nii.gz`
/// - `Channel`: `P1_T1_0000.nii.gz` for channel 0, `P1_T1.nii.gz` for the label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum NamingConvention {
    #[default]
    Source,
    Channel,
}

impl NamingConvention {
    /// Filename suffix (before the extension) identifying a modality
    pub fn suffix(&self, modality: Modality) -> String {
        match (self, modality.channel_index()) {
            (NamingConvention::Source, _) => format!("_{}", modality.name()),
            (NamingConvention::Channel, Some(index)) => format!("_{index:04}"),
            (NamingConvention::Channel, None) => String::new(),
        }
    }

    /// Suffixes in matching order: longest first, the empty suffix last
    pub fn suffixes(&self) -> Vec<(Modality, String)> {
        let mut suffixes = Modality::ALL
            .iter()
            .map(|&m| (m, self.suffix(m)))
            .collect::<Vec<_>>();
        suffixes.sort_by(|(_, a), (_, b)| b.len().cmp(&a.len()));
        suffixes
    }

    /// Split a file stem (extension already removed) into case id and modality
    pub fn parse_stem(&self, stem: &str) -> Option<(String, Modality)> {
        self.suffixes().into_iter().find_map(|(modality, suffix)| {
            match stem.strip_suffix(suffix.as_str()) {
                Some(case_id) if !case_id.is_empty() => Some((case_id.to_string(), modality)),
                _ => None,
            }
        })
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let convention_str = match self {
            NamingConvention::Source => "source",
            NamingConvention::Channel => "channel",
        };
        write!(f, "{}", convention_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NamingConvention::Source, Modality::Flair, "_FLAIR")]
    #[case(NamingConvention::Source, Modality::Mask, "_MASK")]
    #[case(NamingConvention::Channel, Modality::T2, "_0002")]
    #[case(NamingConvention::Channel, Modality::Mask, "")]
    fn test_suffix(
        #[case] convention: NamingConvention,
        #[case] modality: Modality,
        #[case] expected: &str,
    ) {
        assert_eq!(convention.suffix(modality), expected);
    }

    #[rstest]
    #[case(NamingConvention::Source, "P1_T1_FLAIR", Some(("P1_T1", Modality::Flair)))]
    #[case(NamingConvention::Source, "P1_T1_T1", Some(("P1_T1", Modality::T1)))]
    #[case(NamingConvention::Source, "P7_T2", Some(("P7", Modality::T2)))]
    #[case(NamingConvention::Source, "P1_T1", Some(("P1", Modality::T1)))]
    #[case(NamingConvention::Source, "_FLAIR", None)]
    #[case(NamingConvention::Source, "notes", None)]
    #[case(NamingConvention::Channel, "P1_T1_0000", Some(("P1_T1", Modality::Flair)))]
    #[case(NamingConvention::Channel, "P1_T1_0002", Some(("P1_T1", Modality::T2)))]
    #[case(NamingConvention::Channel, "P1_T1", Some(("P1_T1", Modality::Mask)))]
    fn test_parse_stem(
        #[case] convention: NamingConvention,
        #[case] stem: &str,
        #[case] expected: Option<(&str, Modality)>,
    ) {
        let parsed = convention.parse_stem(stem);
        let expected = expected.map(|(id, m)| (id.to_string(), m));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_channel_names() {
        let names = channel_names();
        assert_eq!(names.len(), 3);
        assert_eq!(names["0"], "FLAIR");
        assert_eq!(names["1"], "T1");
        assert_eq!(names["2"], "T2");
    }

    #[test]
    fn test_channel_index_roundtrip() {
        for modality in CHANNELS {
            let index = modality.channel_index().unwrap();
            assert_eq!(Modality::from_channel_index(index), Some(modality));
        }
        assert_eq!(Modality::Mask.channel_index(), None);
        assert!(Modality::Mask.is_label());
    }
}
