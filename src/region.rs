//! Conversion between viewer selections, regions of interest and the
//! location strings the computation backend understands.
//!
//! Location strings are 1-based and inclusive: `11..40` for a plain range,
//! `join(95..100,1..5)` for a range spanning the origin of a circular
//! sequence, and `5^6` for an insertion point between two bases.

use crate::error::CloneError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref INSERTION_RE: Regex = Regex::new(r"^(\d+)\^(\d+)$").expect("valid regex");
    static ref RANGE_RE: Regex = Regex::new(r"^(\d+)\.\.(\d+)$").expect("valid regex");
    static ref JOIN_RE: Regex =
        Regex::new(r"^join\((\d+)\.\.(\d+),1\.\.(\d+)\)$").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionLayer {
    pub start: i64,
    pub end: i64,
}

/// What a sequence viewer reports: a selection layer (`-1` when empty) and
/// a caret position (`-1` when a range is selected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_layer: Option<SelectionLayer>,
    #[serde(default = "no_caret")]
    pub caret_position: i64,
}

fn no_caret() -> i64 {
    -1
}

impl Selection {
    pub fn range(start: usize, end: usize) -> Self {
        Self {
            selection_layer: Some(SelectionLayer {
                start: start as i64,
                end: end as i64,
            }),
            caret_position: -1,
        }
    }

    pub fn caret(position: usize) -> Self {
        Self {
            selection_layer: None,
            caret_position: position as i64,
        }
    }

    pub fn to_region(&self, allow_insertion: bool) -> Result<Region, CloneError> {
        if let Some(layer) = self
            .selection_layer
            .filter(|layer| layer.start >= 0 && layer.end >= 0)
        {
            return Ok(Region::Range {
                start: layer.start as usize,
                end: layer.end as usize,
            });
        }
        if self.caret_position >= 0 {
            if !allow_insertion {
                return Err(CloneError::invalid_input(
                    "Select a region, not a single position",
                ));
            }
            return Ok(Region::Insertion {
                caret: self.caret_position as usize,
            });
        }
        Err(CloneError::invalid_input("Nothing is selected"))
    }
}

/// A region of interest on a template: a sub-range (0-based, inclusive,
/// wrapping when `start > end`) or a zero-width insertion point before base
/// `caret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Selection", into = "Selection")]
pub enum Region {
    Range { start: usize, end: usize },
    Insertion { caret: usize },
}

impl TryFrom<Selection> for Region {
    type Error = CloneError;

    fn try_from(selection: Selection) -> Result<Self, Self::Error> {
        selection.to_region(true)
    }
}

impl From<Region> for Selection {
    fn from(region: Region) -> Self {
        match region {
            Region::Range { start, end } => Selection::range(start, end),
            Region::Insertion { caret } => Selection::caret(caret),
        }
    }
}

impl Region {
    pub fn is_insertion(&self) -> bool {
        matches!(self, Region::Insertion { .. })
    }

    pub fn wraps(&self) -> bool {
        matches!(self, Region::Range { start, end } if start > end)
    }

    /// Number of bases covered on a sequence of `size` bases.
    pub fn len_on(&self, size: usize) -> usize {
        match *self {
            Region::Insertion { .. } => 0,
            Region::Range { start, end } if start <= end => end - start + 1,
            Region::Range { start, end } => size - start + end + 1,
        }
    }
}

pub fn region_to_display_string(region: Option<&Region>) -> String {
    match region {
        // A lone space keeps floating form labels in place
        None => " ".to_string(),
        Some(Region::Insertion { caret }) => format!("insertion at {caret}"),
        Some(Region::Range { start, end }) => format!("{} - {}", start + 1, end + 1),
    }
}

pub fn region_to_location_string(region: &Region, sequence_size: usize) -> String {
    match *region {
        Region::Insertion { caret } => format!("{}^{}", caret, caret + 1),
        Region::Range { start, end } => {
            let start1 = start + 1;
            let end1 = end + 1;
            if end1 >= start1 {
                format!("{start1}..{end1}")
            } else {
                format!("join({start1}..{sequence_size},1..{end1})")
            }
        }
    }
}

fn capture_usize(captures: &regex::Captures, idx: usize, text: &str) -> Result<usize, CloneError> {
    captures[idx]
        .parse::<usize>()
        .map_err(|e| CloneError::invalid_input(format!("Bad coordinate in '{text}': {e}")))
}

pub fn location_string_to_region(text: &str, sequence_size: usize) -> Result<Region, CloneError> {
    let text = text.trim();
    if let Some(captures) = INSERTION_RE.captures(text) {
        let left = capture_usize(&captures, 1, text)?;
        let right = capture_usize(&captures, 2, text)?;
        if right != left + 1 || left > sequence_size {
            return Err(CloneError::invalid_input(format!(
                "Insertion point '{text}' is not between two adjacent bases"
            )));
        }
        return Ok(Region::Insertion { caret: left });
    }
    if let Some(captures) = RANGE_RE.captures(text) {
        let start1 = capture_usize(&captures, 1, text)?;
        let end1 = capture_usize(&captures, 2, text)?;
        if start1 == 0 || end1 < start1 || end1 > sequence_size {
            return Err(CloneError::invalid_input(format!(
                "Range '{text}' is outside of a {sequence_size} bp sequence"
            )));
        }
        return Ok(Region::Range {
            start: start1 - 1,
            end: end1 - 1,
        });
    }
    if let Some(captures) = JOIN_RE.captures(text) {
        let start1 = capture_usize(&captures, 1, text)?;
        let upto = capture_usize(&captures, 2, text)?;
        let end1 = capture_usize(&captures, 3, text)?;
        if upto != sequence_size || start1 == 0 || end1 == 0 || end1 >= start1 {
            return Err(CloneError::invalid_input(format!(
                "'{text}' does not span the origin of a {sequence_size} bp sequence"
            )));
        }
        return Ok(Region::Range {
            start: start1 - 1,
            end: end1 - 1,
        });
    }
    Err(CloneError::invalid_input(format!(
        "Unsupported location string '{text}'"
    )))
}
