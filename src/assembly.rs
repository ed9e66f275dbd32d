//! In-silico assembly products, used to preview what a primer design will
//! build before the backend is asked for primers.

use crate::{
    dna_sequence::SequenceRecord, error::CloneError, feature_location::labelled_feature,
    region::Region,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SPACER_LABEL: &str = "spacer";
pub const TRANSLATION_FRAME_LABEL: &str = "translation frame";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Forward,
    Reverse,
}

impl Orientation {
    pub fn is_forward(&self) -> bool {
        matches!(self, Orientation::Forward)
    }

    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Orientation::Forward
        } else {
            Orientation::Reverse
        }
    }
}

/// One fragment of an assembly: which part of which sequence, in which
/// orientation. `range == None` uses the whole sequence.
#[derive(Debug, Clone, Copy)]
pub struct FragmentJoin<'a> {
    pub sequence: &'a SequenceRecord,
    pub range: Option<(usize, usize)>,
    pub orientation: Orientation,
}

impl<'a> FragmentJoin<'a> {
    pub fn new(
        sequence: &'a SequenceRecord,
        region: Option<&Region>,
        orientation: Orientation,
    ) -> Self {
        let range = match region {
            Some(Region::Range { start, end }) => Some((*start, *end)),
            _ => None,
        };
        Self {
            sequence,
            range,
            orientation,
        }
    }

    fn extract(&self) -> Result<SequenceRecord, CloneError> {
        let piece = match self.range {
            Some((start, end)) => self.sequence.extract_range(start, end)?,
            None if self.sequence.is_empty() => SequenceRecord::from_sequence(""),
            None => self.sequence.extract_range(0, self.sequence.len() - 1)?,
        };
        Ok(match self.orientation {
            Orientation::Forward => piece,
            Orientation::Reverse => piece.reverse_complement(),
        })
    }
}

/// Joins fragments and spacers into one linear, unnamed record.
///
/// A linear assembly takes `n + 1` spacers (before the first fragment, then
/// after each fragment); a circular one takes `n`, the last one closing the
/// circle. Empty spacers are skipped, others get a `misc_feature` labelled
/// `spacer_feature_label`.
pub fn join_sequences_into_single_sequence(
    fragments: &[FragmentJoin],
    spacers: &[String],
    circular_assembly: bool,
    spacer_feature_label: &str,
) -> Result<SequenceRecord, CloneError> {
    let spacer_records: Vec<Option<SequenceRecord>> = spacers
        .iter()
        .map(|spacer| {
            (!spacer.is_empty())
                .then(|| SequenceRecord::from_spacer(spacer, spacer_feature_label))
        })
        .collect();
    let spacer_at = |idx: usize| spacer_records.get(idx).and_then(|s| s.as_ref());

    let mut pieces: Vec<SequenceRecord> = Vec::with_capacity(fragments.len() + spacers.len());
    if !circular_assembly {
        if let Some(spacer) = spacer_at(0) {
            pieces.push(spacer.clone());
        }
    }
    for (idx, fragment) in fragments.iter().enumerate() {
        pieces.push(fragment.extract()?);
        let following = if circular_assembly { idx } else { idx + 1 };
        if let Some(spacer) = spacer_at(following) {
            pieces.push(spacer.clone());
        }
    }

    let mut pieces = pieces.into_iter();
    let mut ret = pieces
        .next()
        .unwrap_or_else(|| SequenceRecord::from_sequence(""));
    for piece in pieces {
        ret.append(&piece);
    }
    Ok(ret)
}

/// Gateway BP products carry the reading frame through both attB sites.
///
/// `translation_frame` is `[left_offset, right_offset]`: the left CDS covers
/// `left_offset..left_spacer_len`, the right one the largest whole number of
/// codons of the right spacer that ends `right_offset` bases before the end.
pub fn add_translation_frame_features(
    product: &mut SequenceRecord,
    left_spacer_len: usize,
    right_spacer_len: usize,
    translation_frame: [usize; 2],
) {
    let [left_offset, right_offset] = translation_frame;
    if left_offset < left_spacer_len {
        product.features_mut().push(labelled_feature(
            "CDS",
            left_offset as i64,
            left_spacer_len as i64,
            false,
            TRANSLATION_FRAME_LABEL,
        ));
    }

    let width = 3 * (right_spacer_len.saturating_sub(right_offset) / 3);
    let Some(end) = product.len().checked_sub(right_offset) else {
        return;
    };
    if width == 0 || width > end {
        return;
    }
    product.features_mut().push(labelled_feature(
        "CDS",
        (end - width) as i64,
        end as i64,
        false,
        TRANSLATION_FRAME_LABEL,
    ));
}

/// Product of inserting a PCR fragment into `target` by homologous
/// recombination. `rois[0]` is the amplified region of `template`,
/// `rois[1]` the region of `target` that is replaced (or an insertion point).
pub fn simulate_homologous_recombination(
    template: &SequenceRecord,
    target: &SequenceRecord,
    rois: &[Region],
    invert_fragment: bool,
    spacers: &[String],
) -> Result<SequenceRecord, CloneError> {
    let [amplified, replaced] = rois else {
        return Err(CloneError::invalid_input(
            "Homologous recombination needs a template region and a target region",
        ));
    };
    if amplified.is_insertion() {
        return Err(CloneError::invalid_input(
            "The amplified region of the template cannot be a single position",
        ));
    }
    let fragment = FragmentJoin::new(
        template,
        Some(amplified),
        Orientation::from_forward(!invert_fragment),
    );
    let insert = join_sequences_into_single_sequence(
        &[fragment],
        spacers,
        false,
        DEFAULT_SPACER_LABEL,
    )?;
    target.replace_region(replaced, &insert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_location::{collect_location_ranges, feature_kind, feature_label};
    use crate::iupac_code::reverse_complement;

    fn ranges_of(record: &SequenceRecord, idx: usize) -> Vec<(i64, i64)> {
        let mut ranges = vec![];
        collect_location_ranges(&record.features()[idx].location, &mut ranges);
        ranges
    }

    fn spacers(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn range(start: usize, end: usize) -> Region {
        Region::Range { start, end }
    }

    #[test]
    fn test_reverse_fragment_can_be_recovered() {
        let first = SequenceRecord::from_sequence("AAAAACCCCC");
        let second = SequenceRecord::from_sequence("GATTACAGGT");
        let fragments = [
            FragmentJoin::new(&first, Some(&range(0, 4)), Orientation::Forward),
            FragmentJoin::new(&second, Some(&range(2, 8)), Orientation::Reverse),
        ];
        let joined =
            join_sequences_into_single_sequence(&fragments, &[], true, DEFAULT_SPACER_LABEL)
                .unwrap();
        assert_eq!(joined.len(), 12);
        let tail = joined.get_range(5, 11).unwrap();
        assert_eq!(reverse_complement(&tail), second.get_range(2, 8).unwrap());
        assert!(!joined.is_circular());
        assert_eq!(joined.name(), None);
    }

    #[test]
    fn test_spacers_between_fragments() {
        let first = SequenceRecord::from_sequence("AAAAAAAA");
        let second = SequenceRecord::from_sequence("CCCCCCCC");
        let fragments = [
            FragmentJoin::new(&first, Some(&range(0, 3)), Orientation::Forward),
            FragmentJoin::new(&second, Some(&range(0, 4)), Orientation::Forward),
        ];
        let joined = join_sequences_into_single_sequence(
            &fragments,
            &spacers(&["GG", "TTT", ""]),
            false,
            "linker",
        )
        .unwrap();
        assert_eq!(joined.get_forward_string(), "GGAAAATTTCCCCC");
        assert_eq!(joined.len(), 4 + 5 + 2 + 3);
        assert_eq!(joined.features().len(), 2);
        assert_eq!(feature_kind(&joined.features()[0]), "misc_feature");
        assert_eq!(feature_label(&joined.features()[0]), Some("linker"));
        assert_eq!(ranges_of(&joined, 0), vec![(0, 2)]);
        assert_eq!(ranges_of(&joined, 1), vec![(6, 9)]);
    }

    #[test]
    fn test_circular_assembly_has_no_leading_spacer() {
        let first = SequenceRecord::from_sequence("AAAA");
        let second = SequenceRecord::from_sequence("CCCC");
        let fragments = [
            FragmentJoin::new(&first, None, Orientation::Forward),
            FragmentJoin::new(&second, None, Orientation::Forward),
        ];
        let joined = join_sequences_into_single_sequence(
            &fragments,
            &spacers(&["G", "T"]),
            true,
            DEFAULT_SPACER_LABEL,
        )
        .unwrap();
        assert_eq!(joined.get_forward_string(), "AAAAGCCCCT");
        assert_eq!(ranges_of(&joined, 1), vec![(9, 10)]);
    }

    #[test]
    fn test_fragment_features_follow_orientation() {
        let mut template = SequenceRecord::from_sequence("AAAACCCCGGGG");
        template
            .features_mut()
            .push(labelled_feature("CDS", 4, 8, false, "orf"));
        let fragments = [FragmentJoin::new(
            &template,
            Some(&Region::Range { start: 2, end: 9 }),
            Orientation::Reverse,
        )];
        let joined = join_sequences_into_single_sequence(
            &fragments,
            &spacers(&["TT", ""]),
            false,
            DEFAULT_SPACER_LABEL,
        )
        .unwrap();
        assert_eq!(joined.get_forward_string(), "TTCCGGGGTT");
        // spacer first, then the reverse-complemented CDS
        assert_eq!(ranges_of(&joined, 0), vec![(0, 2)]);
        assert_eq!(ranges_of(&joined, 1), vec![(4, 8)]);
    }

    #[test]
    fn test_translation_frame_features() {
        let mut product = SequenceRecord::from_sequence(&"A".repeat(26));
        add_translation_frame_features(&mut product, 10, 11, [1, 2]);
        assert_eq!(product.features().len(), 2);
        assert_eq!(ranges_of(&product, 0), vec![(1, 10)]);
        assert_eq!(ranges_of(&product, 1), vec![(15, 24)]);
        assert_eq!(feature_kind(&product.features()[1]), "CDS");
        assert_eq!(
            feature_label(&product.features()[1]),
            Some(TRANSLATION_FRAME_LABEL)
        );
    }

    #[test]
    fn test_translation_frame_rounds_down_to_codons() {
        let mut product = SequenceRecord::from_sequence(&"A".repeat(30));
        add_translation_frame_features(&mut product, 12, 12, [0, 0]);
        assert_eq!(ranges_of(&product, 1), vec![(18, 30)]);

        let mut product = SequenceRecord::from_sequence(&"A".repeat(30));
        add_translation_frame_features(&mut product, 12, 8, [0, 1]);
        // floor((8 - 1) / 3) = 2 codons ending one base before the end
        assert_eq!(ranges_of(&product, 1), vec![(23, 29)]);
    }

    #[test]
    fn test_homologous_recombination() {
        let template = SequenceRecord::from_sequence("AAAACCCCGGGG");
        let target = SequenceRecord::from_sequence("TTTTTTTTTT");
        let rois = [
            Region::Range { start: 4, end: 7 },
            Region::Insertion { caret: 5 },
        ];
        let product = simulate_homologous_recombination(
            &template,
            &target,
            &rois,
            false,
            &spacers(&["GA", "TC"]),
        )
        .unwrap();
        assert_eq!(product.get_forward_string(), "TTTTTGACCCCTCTTTTT");

        let rois = [
            Region::Range { start: 4, end: 7 },
            Region::Range { start: 2, end: 7 },
        ];
        let product =
            simulate_homologous_recombination(&template, &target, &rois, true, &spacers(&["", ""]))
                .unwrap();
        assert_eq!(product.get_forward_string(), "TTGGGGTT");
    }

    #[test]
    fn test_homologous_recombination_rejects_missing_regions() {
        let template = SequenceRecord::from_sequence("AAAA");
        let target = SequenceRecord::from_sequence("TTTT");
        assert!(
            simulate_homologous_recombination(&template, &target, &[], false, &[]).is_err()
        );
        let rois = [Region::Insertion { caret: 1 }, Region::Insertion { caret: 1 }];
        assert!(
            simulate_homologous_recombination(&template, &target, &rois, false, &[]).is_err()
        );
    }
}
