use crate::{
    error::CloneError,
    feature_location::{
        build_location, feature_is_reverse, labelled_feature, unwrapped_feature_ranges,
    },
    iupac_code,
    region::Region,
};
use anyhow::Result;
use bio::io::fasta;
use gb_io::{
    reader::SeqReader,
    seq::{Feature, Seq, Topology},
};
use serde::{Deserialize, Serialize};
use std::{fmt, fs::File};

pub const SPACER_FEATURE_KIND: &str = "misc_feature";

/// A DNA entity of the cloning graph: bases, topology and annotations.
///
/// Every transformation returns a new record; the receiver is never changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceRecord {
    seq: Seq,
}

impl SequenceRecord {
    pub fn from_sequence(sequence: &str) -> Self {
        Self::from_u8(sequence.as_bytes())
    }

    /// Every FASTA record becomes a linear sequence named after its id.
    /// A malformed record fails the whole file.
    pub fn from_fasta_file(filename: &str) -> Result<Vec<SequenceRecord>> {
        let mut ret = vec![];
        for record in fasta::Reader::new(File::open(filename)?).records() {
            let record = record?;
            let mut dna = Self::from_u8(record.seq());
            dna.set_name(record.id());
            ret.push(dna);
        }
        Ok(ret)
    }

    pub fn from_genbank_file(filename: &str) -> Result<Vec<SequenceRecord>> {
        Ok(gb_io::reader::parse_file(filename)?
            .into_iter()
            .map(SequenceRecord::from_genbank_seq)
            .collect())
    }

    pub fn from_genbank_str(text: &str) -> Result<Vec<SequenceRecord>> {
        let mut ret = vec![];
        for seq in SeqReader::new(text.as_bytes()) {
            ret.push(Self::from_genbank_seq(seq?));
        }
        Ok(ret)
    }

    pub fn from_genbank_seq(seq: Seq) -> Self {
        Self { seq }
    }

    /// A spacer fragment, annotated over its whole length.
    pub fn from_spacer(spacer: &str, label: &str) -> Self {
        let mut ret = Self::from_sequence(spacer);
        if !spacer.is_empty() {
            ret.seq.features.push(labelled_feature(
                SPACER_FEATURE_KIND,
                0,
                spacer.len() as i64,
                false,
                label,
            ));
        }
        ret
    }

    fn from_u8(s: &[u8]) -> Self {
        let mut seq = Seq::empty();
        seq.topology = Topology::Linear;
        seq.molecule_type = Some("DNA".to_string());
        seq.seq = s.to_vec();
        seq.len = Some(s.len());
        Self { seq }
    }

    pub fn write_genbank_file(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        gb_io::writer::write(file, &self.seq)?;
        Ok(())
    }

    pub fn to_genbank_string(&self) -> Result<String> {
        let mut buffer: Vec<u8> = vec![];
        gb_io::writer::write(&mut buffer, &self.seq)?;
        Ok(String::from_utf8(buffer)?)
    }

    #[inline(always)]
    fn forward(&self) -> &[u8] {
        &self.seq.seq
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.forward().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward().is_empty()
    }

    pub fn is_circular(&self) -> bool {
        self.seq.topology == Topology::Circular
    }

    pub fn set_circular(&mut self, is_circular: bool) {
        self.seq.topology = match is_circular {
            true => Topology::Circular,
            false => Topology::Linear,
        };
    }

    pub fn name(&self) -> Option<&str> {
        self.seq.name.as_deref()
    }

    pub fn set_name(&mut self, name: &str) {
        self.seq.name = Some(name.to_string());
    }

    pub fn features(&self) -> &Vec<Feature> {
        &self.seq.features
    }

    pub fn features_mut(&mut self) -> &mut Vec<Feature> {
        &mut self.seq.features
    }

    pub fn get_forward_string(&self) -> String {
        String::from_utf8_lossy(self.forward()).to_string()
    }

    fn span_length(&self, start: usize, end: usize) -> Result<usize, CloneError> {
        let len = self.len();
        if start >= len || end >= len {
            return Err(CloneError::invalid_input(format!(
                "Range {}..{} is outside of a {len} bp sequence",
                start + 1,
                end + 1
            )));
        }
        if start <= end {
            Ok(end - start + 1)
        } else if self.is_circular() {
            Ok(len - start + end + 1)
        } else {
            Err(CloneError::invalid_input(format!(
                "Range {}..{} wraps around the origin of a linear sequence",
                start + 1,
                end + 1
            )))
        }
    }

    fn span_bytes(&self, start: usize, length: usize) -> Vec<u8> {
        let len = self.len();
        (0..length)
            .map(|i| self.forward()[(start + i) % len])
            .collect()
    }

    /// Bases of the inclusive range `start..=end`, wrapping around the
    /// origin of a circular sequence when `start > end`.
    pub fn get_range(&self, start: usize, end: usize) -> Result<Vec<u8>, CloneError> {
        let length = self.span_length(start, end)?;
        Ok(self.span_bytes(start, length))
    }

    /// Like [`Self::get_range`], but also carries over every feature that
    /// lies completely inside the range. The result is linear.
    pub fn extract_range(&self, start: usize, end: usize) -> Result<SequenceRecord, CloneError> {
        let length = self.span_length(start, end)?;
        Ok(self.extract_span(start, length))
    }

    /// `length` bases starting at `start`. Callers check bounds.
    fn extract_span(&self, start: usize, length: usize) -> SequenceRecord {
        let mut ret = Self::from_u8(&self.span_bytes(start, length));
        if length == 0 {
            return ret;
        }
        let len = self.len() as i64;
        let window_start = start as i64;
        let window_end = window_start + length as i64;
        let shifts = if self.is_circular() {
            vec![0, len]
        } else {
            vec![0]
        };

        for feature in self.features() {
            let parts = unwrapped_feature_ranges(feature, len);
            let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
                continue;
            };
            let Some(shift) = shifts
                .iter()
                .copied()
                .find(|shift| first.0 + shift >= window_start && last.1 + shift <= window_end)
            else {
                continue;
            };
            let moved: Vec<(i64, i64)> = parts
                .iter()
                .map(|(s, e)| (s + shift - window_start, e + shift - window_start))
                .collect();
            if let Some(location) = build_location(&moved, feature_is_reverse(feature)) {
                ret.seq.features.push(Feature {
                    location,
                    ..feature.clone()
                });
            }
        }
        ret
    }

    /// Reverse complement of bases and of every feature location.
    pub fn reverse_complement(&self) -> SequenceRecord {
        let len = self.len() as i64;
        let mut ret = Self::from_u8(&iupac_code::reverse_complement(self.forward()));
        ret.seq.topology = self.seq.topology.clone();
        ret.seq.name = self.seq.name.clone();
        for feature in self.features() {
            let mirrored: Vec<(i64, i64)> = unwrapped_feature_ranges(feature, len)
                .iter()
                .rev()
                .map(|(s, e)| (len - e, len - s))
                .map(|(s, e)| if s < 0 { (s + len, e + len) } else { (s, e) })
                .collect();
            if let Some(location) = build_location(&mirrored, !feature_is_reverse(feature)) {
                ret.seq.features.push(Feature {
                    location,
                    ..feature.clone()
                });
            }
        }
        ret
    }

    /// Inserts `other` at the end, shifting its features accordingly.
    pub fn append(&mut self, other: &SequenceRecord) {
        let offset = self.len() as i64;
        let other_len = other.len() as i64;
        for feature in other.features() {
            let parts: Vec<(i64, i64)> = unwrapped_feature_ranges(feature, other_len)
                .iter()
                .map(|(s, e)| (s + offset, e + offset))
                .collect();
            if let Some(location) = build_location(&parts, feature_is_reverse(feature)) {
                self.seq.features.push(Feature {
                    location,
                    ..feature.clone()
                });
            }
        }
        self.seq.seq.extend_from_slice(other.forward());
        self.seq.len = Some(self.seq.seq.len());
    }

    /// A new record where `region` is replaced by `insert` (or, for an
    /// insertion point, where `insert` is placed before base `caret`).
    /// Features overlapping the replaced region are dropped.
    pub fn replace_region(
        &self,
        region: &Region,
        insert: &SequenceRecord,
    ) -> Result<SequenceRecord, CloneError> {
        let len = self.len();
        let mut ret = match *region {
            Region::Insertion { caret } => {
                if caret > len {
                    return Err(CloneError::invalid_input(format!(
                        "Insertion point {caret} is outside of a {len} bp sequence"
                    )));
                }
                let mut ret = self.extract_span(0, caret);
                ret.append(insert);
                ret.append(&self.extract_span(caret, len - caret));
                ret
            }
            Region::Range { start, end } if start <= end => {
                self.span_length(start, end)?;
                let mut ret = self.extract_span(0, start);
                ret.append(insert);
                ret.append(&self.extract_span(end + 1, len - end - 1));
                ret
            }
            Region::Range { start, end } => {
                self.span_length(start, end)?;
                let mut ret = self.extract_span(end + 1, start - end - 1);
                ret.append(insert);
                ret
            }
        };
        ret.seq.topology = self.seq.topology.clone();
        ret.seq.name = self.seq.name.clone();
        Ok(ret)
    }
}

impl fmt::Display for SequenceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.forward()))
    }
}

impl From<String> for SequenceRecord {
    fn from(s: String) -> Self {
        SequenceRecord::from_u8(s.as_bytes())
    }
}
