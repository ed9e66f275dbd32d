//! Primer table export (CSV/TSV).

use crate::{
    error::{CloneError, ErrorCode},
    primer_details::{PcrDetails, PrimerDetails},
};
use cloneplan_protocol::{Primer, PrimerId, ThermoResult};
use csv::WriterBuilder;

pub const EXPORT_COLUMNS: [&str; 16] = [
    "id",
    "name",
    "sequence",
    "length",
    "melting_temperature",
    "gc_content",
    "homodimer_melting_temperature",
    "homodimer_deltaG",
    "hairpin_melting_temperature",
    "hairpin_deltaG",
    "pcr_source_id",
    "binding_length",
    "binding_melting_temperature",
    "binding_gc_content",
    "heterodimer_melting_temperature",
    "heterodimer_deltaG",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PrimerWithDetails {
    pub primer: Primer,
    pub details: PrimerDetails,
}

// Rounding can produce -0, which would print as "-0".
fn no_negative_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

fn format_temperature(value: f64) -> String {
    no_negative_zero((value * 10.0).round() / 10.0).to_string()
}

fn format_delta_g(value: f64) -> String {
    no_negative_zero(value.round()).to_string()
}

/// `gc_content` is a fraction; the table shows whole percent.
fn format_gc(value: f64) -> String {
    no_negative_zero((value * 100.0).round()).to_string()
}

fn thermo_cells(result: Option<&ThermoResult>) -> [String; 2] {
    match result {
        Some(result) => [
            format_temperature(result.melting_temperature),
            format_delta_g(result.delta_g),
        ],
        None => [String::new(), String::new()],
    }
}

fn pcr_cells(primer_id: PrimerId, pcr_details: &[PcrDetails]) -> [String; 6] {
    let found = pcr_details.iter().find_map(|pcr| {
        [&pcr.fwd_primer, &pcr.rvs_primer]
            .into_iter()
            .find(|p| p.id == primer_id)
            .map(|p| (pcr, p))
    });
    let Some((pcr, primer)) = found else {
        return Default::default();
    };
    let [het_tm, het_dg] = thermo_cells(pcr.heterodimer.as_ref());
    [
        pcr.source_id.to_string(),
        primer.binding_length.to_string(),
        format_temperature(primer.details.melting_temperature),
        format_gc(primer.details.gc_content),
        het_tm,
        het_dg,
    ]
}

fn primer_row(entry: &PrimerWithDetails, pcr_details: &[PcrDetails]) -> Vec<String> {
    let details = &entry.details;
    let mut row = vec![
        entry.primer.id.to_string(),
        entry.primer.name.clone(),
        entry.primer.sequence.clone(),
        details.length.to_string(),
        format_temperature(details.melting_temperature),
        format_gc(details.gc_content),
    ];
    row.extend(thermo_cells(details.homodimer.as_ref()));
    row.extend(thermo_cells(details.hairpin.as_ref()));
    row.extend(pcr_cells(entry.primer.id, pcr_details));
    row
}

/// Header plus one row per primer. Primers that are not used by any of the
/// given PCRs get empty PCR columns. Empty input gives an empty string.
pub fn primers_to_tabular_file(
    primers: &[PrimerWithDetails],
    pcr_details: &[PcrDetails],
    separator: u8,
) -> Result<String, CloneError> {
    if primers.is_empty() {
        return Ok(String::new());
    }
    let internal = |e: &dyn std::fmt::Display| {
        CloneError::new(ErrorCode::Internal, format!("Could not write primer table: {e}"))
    };
    let mut writer = WriterBuilder::new()
        .delimiter(separator)
        .from_writer(vec![]);
    writer.write_record(EXPORT_COLUMNS).map_err(|e| internal(&e))?;
    for entry in primers {
        writer
            .write_record(primer_row(entry, pcr_details))
            .map_err(|e| internal(&e))?;
    }
    let bytes = writer.into_inner().map_err(|e| internal(&e))?;
    String::from_utf8(bytes).map_err(|e| internal(&e))
}
