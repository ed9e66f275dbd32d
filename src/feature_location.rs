//! Feature location/strand utilities used by the sequence and assembly code.

use std::borrow::Cow;

use gb_io::seq::{Feature, Location};

const LABEL_QUALIFIERS: [&str; 3] = ["label", "name", "gene"];

/// Calls `visit(start, end, reverse)` for every located part, in order.
/// Ranges come out half-open with `start <= end`; parts with negative
/// coordinates are skipped.
fn walk_location(location: &Location, reverse: bool, visit: &mut impl FnMut(i64, i64, bool)) {
    match location {
        Location::Range((from, _), (to, _)) | Location::Between(from, to) => {
            if *from >= 0 && *to >= 0 {
                visit((*from).min(*to), (*from).max(*to), reverse);
            }
        }
        Location::Complement(inner) => walk_location(inner, !reverse, visit),
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => parts
            .iter()
            .for_each(|part| walk_location(part, reverse, visit)),
        Location::External(_, Some(inner)) => walk_location(inner, reverse, visit),
        Location::External(_, None) | Location::Gap(_) => {}
    }
}

/// A feature counts as reverse when most of its parts are complemented.
pub fn feature_is_reverse(feature: &Feature) -> bool {
    let (mut parts, mut reversed) = (0, 0);
    walk_location(&feature.location, false, &mut |_, _, reverse| {
        parts += 1;
        reversed += usize::from(reverse);
    });
    parts > 0 && reversed > parts / 2
}

/// Half-open `(start, end)` ranges in the order they appear in the location.
pub fn collect_location_ranges(location: &Location, ranges: &mut Vec<(i64, i64)>) {
    walk_location(location, false, &mut |start, end, _| ranges.push((start, end)));
}

/// Ranges of a feature, shifted by whole sequence lengths so that every part
/// starts at or after the end of the previous one. A feature written as
/// `join(91..100,1..10)` on a 100 bp plasmid becomes `[(90,100),(100,110)]`.
pub fn unwrapped_feature_ranges(feature: &Feature, seq_len: i64) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    collect_location_ranges(&feature.location, &mut ranges);
    if seq_len <= 0 {
        return ranges;
    }
    let mut out: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
    for (mut start, mut end) in ranges {
        if let Some((_, prev_end)) = out.last() {
            while start < *prev_end {
                start += seq_len;
                end += seq_len;
            }
        }
        out.push((start, end));
    }
    out
}

pub fn build_location(parts: &[(i64, i64)], reverse: bool) -> Option<Location> {
    let location = match parts {
        [] => return None,
        [(start, end)] => Location::simple_range(*start, *end),
        _ => Location::Join(
            parts
                .iter()
                .map(|(start, end)| Location::simple_range(*start, *end))
                .collect(),
        ),
    };
    Some(if reverse {
        Location::Complement(Box::new(location))
    } else {
        location
    })
}

pub fn labelled_feature(kind: &str, start: i64, end: i64, reverse: bool, label: &str) -> Feature {
    Feature {
        kind: Cow::Owned(kind.to_string()),
        location: build_location(&[(start, end)], reverse)
            .unwrap_or_else(|| Location::simple_range(start, end)),
        qualifiers: vec![(Cow::from("label"), Some(label.to_string()))],
    }
}

pub fn feature_label(feature: &Feature) -> Option<&str> {
    LABEL_QUALIFIERS.iter().find_map(|wanted| {
        feature
            .qualifiers
            .iter()
            .find(|(key, value)| &**key == *wanted && value.is_some())
            .and_then(|(_, value)| value.as_deref())
    })
}

pub fn feature_kind(feature: &Feature) -> &str {
    &feature.kind
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_feature(location: Location) -> Feature {
        Feature {
            kind: Cow::from("primer_bind"),
            location,
            qualifiers: vec![],
        }
    }

    #[test]
    fn complemented_join_keeps_part_order() {
        let feature = make_feature(Location::Complement(Box::new(Location::Join(vec![
            Location::simple_range(10, 20),
            Location::simple_range(40, 50),
        ]))));
        let mut ranges = vec![];
        collect_location_ranges(&feature.location, &mut ranges);
        assert_eq!(ranges, vec![(10, 20), (40, 50)]);
        assert!(feature_is_reverse(&feature));
    }

    #[test]
    fn unwraps_origin_spanning_join() {
        let feature = make_feature(Location::Join(vec![
            Location::simple_range(90, 100),
            Location::simple_range(0, 10),
        ]));
        assert_eq!(
            unwrapped_feature_ranges(&feature, 100),
            vec![(90, 100), (100, 110)]
        );
    }

    #[test]
    fn builds_complemented_join() {
        let location = build_location(&[(0, 3), (5, 8)], true).unwrap();
        let feature = make_feature(location);
        assert!(feature_is_reverse(&feature));
        let mut ranges = vec![];
        collect_location_ranges(&feature.location, &mut ranges);
        assert_eq!(ranges, vec![(0, 3), (5, 8)]);
        assert!(build_location(&[], false).is_none());
    }

    #[test]
    fn label_lookup_prefers_label_qualifier() {
        let mut feature = labelled_feature("misc_feature", 0, 4, false, "spacer");
        feature
            .qualifiers
            .insert(0, (Cow::from("gene"), Some("lacZ".to_string())));
        assert_eq!(feature_label(&feature), Some("spacer"));
        assert_eq!(feature_kind(&feature), "misc_feature");
    }
}
