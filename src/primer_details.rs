//! Primer and PCR properties fetched from the backend, memoized per process
//! (or per test) in a [`PropertyCache`].

use crate::{
    backend::{BackendClient, BackendError},
    cloning_graph::{CloningState, PrimerBinding, SourceId, SourceKind},
    error::CloneError,
};
use cloneplan_protocol::{PrimerId, ThermoResult};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::Display,
    sync::{Mutex, PoisonError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerDetails {
    pub length: usize,
    pub melting_temperature: f64,
    /// Fraction between 0 and 1
    pub gc_content: f64,
    #[serde(default)]
    pub homodimer: Option<ThermoResult>,
    #[serde(default)]
    pub hairpin: Option<ThermoResult>,
}

/// Details of the hybridizing 3' part of a primer and, when that is shorter
/// than the primer, of the full primer.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDetails {
    pub binding: PrimerDetails,
    pub full: Option<PrimerDetails>,
}

impl BindingDetails {
    pub fn melting_temperature_label(&self) -> String {
        format_with_binding(
            format!("{:.1}", self.binding.melting_temperature),
            self.full
                .as_ref()
                .map(|full| format!("{:.1}", full.melting_temperature)),
        )
    }

    pub fn gc_content_label(&self) -> String {
        format_with_binding(
            format!("{:.0}", self.binding.gc_content * 100.0),
            self.full
                .as_ref()
                .map(|full| format!("{:.0}", full.gc_content * 100.0)),
        )
    }
}

/// `"{binding} ({full})"`, or just the value when the whole primer binds.
pub fn format_with_binding<T: Display>(binding: T, full: Option<T>) -> String {
    match full {
        Some(full) => format!("{binding} ({full})"),
        None => binding.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrPrimerDetails {
    pub id: PrimerId,
    pub name: String,
    pub binding_length: usize,
    /// Over the binding part only
    pub details: PrimerDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrDetails {
    pub source_id: SourceId,
    pub fwd_primer: PcrPrimerDetails,
    pub rvs_primer: PcrPrimerDetails,
    pub heterodimer: Option<ThermoResult>,
}

/// Append-only caches keyed by primer sequence, and by the sorted pair of
/// sequences for heterodimers. Entries are never evicted.
#[derive(Debug, Default)]
pub struct PropertyCache {
    primer_details: Mutex<HashMap<String, PrimerDetails>>,
    heterodimers: Mutex<HashMap<(String, String), ThermoResult>>,
}

fn heterodimer_key(sequence1: &str, sequence2: &str) -> (String, String) {
    if sequence1 <= sequence2 {
        (sequence1.to_string(), sequence2.to_string())
    } else {
        (sequence2.to_string(), sequence1.to_string())
    }
}

/// The 3' `binding_length` bases; the whole sequence if that is shorter.
fn binding_part(sequence: &str, binding_length: usize) -> &str {
    let skip = sequence.chars().count().saturating_sub(binding_length);
    sequence
        .char_indices()
        .nth(skip)
        .map_or("", |(idx, _)| &sequence[idx..])
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.primer_details
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.heterodimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn primer_details(
        &self,
        backend: &dyn BackendClient,
        sequence: &str,
    ) -> Result<PrimerDetails, BackendError> {
        if let Some(hit) = self
            .primer_details
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sequence)
        {
            trace!("Primer details cache hit for {sequence}");
            return Ok(hit.clone());
        }
        // The lock is not held across the request; two concurrent misses on
        // the same sequence both fetch, and the first stored value wins.
        let response = backend.primer_details(sequence)?;
        let details = PrimerDetails {
            length: sequence.chars().count(),
            melting_temperature: response.melting_temperature,
            gc_content: response.gc_content,
            homodimer: response.homodimer,
            hairpin: response.hairpin,
        };
        Ok(self
            .primer_details
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(sequence.to_string())
            .or_insert(details)
            .clone())
    }

    pub fn heterodimer_details(
        &self,
        backend: &dyn BackendClient,
        sequence1: &str,
        sequence2: &str,
    ) -> Result<ThermoResult, BackendError> {
        let key = heterodimer_key(sequence1, sequence2);
        if let Some(hit) = self
            .heterodimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }
        let result = backend.primer_heterodimer(&key.0, &key.1)?;
        Ok(self
            .heterodimers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(result)
            .clone())
    }

    /// All lookups run concurrently; the first failure fails the whole call.
    pub fn multiple_primer_details(
        &self,
        backend: &dyn BackendClient,
        sequences: &[String],
    ) -> Result<Vec<PrimerDetails>, BackendError> {
        sequences
            .par_iter()
            .map(|sequence| self.primer_details(backend, sequence))
            .collect()
    }

    pub fn binding_details(
        &self,
        backend: &dyn BackendClient,
        sequence: &str,
        binding_length: Option<usize>,
    ) -> Result<BindingDetails, BackendError> {
        let full_length = sequence.chars().count();
        let binding_length = binding_length
            .filter(|length| *length < full_length)
            .unwrap_or(full_length);
        if binding_length == full_length {
            return Ok(BindingDetails {
                binding: self.primer_details(backend, sequence)?,
                full: None,
            });
        }
        let (binding, full) = rayon::join(
            || self.primer_details(backend, binding_part(sequence, binding_length)),
            || self.primer_details(backend, sequence),
        );
        Ok(BindingDetails {
            binding: binding?,
            full: Some(full?),
        })
    }

    fn pcr_primer_details(
        &self,
        backend: &dyn BackendClient,
        primer: &PcrPrimerInput,
    ) -> Result<PcrPrimerDetails, BackendError> {
        Ok(PcrPrimerDetails {
            id: primer.id,
            name: primer.name.clone(),
            binding_length: primer.binding_length,
            details: self.primer_details(
                backend,
                binding_part(&primer.sequence, primer.binding_length),
            )?,
        })
    }

    /// Details for every PCR source in `source_ids` that has both primers.
    /// Sources, and the three lookups of each source, run concurrently.
    pub fn pcr_details(
        &self,
        backend: &dyn BackendClient,
        state: &CloningState,
        source_ids: &[SourceId],
    ) -> Result<Vec<PcrDetails>, CloneError> {
        let mut inputs = vec![];
        for source_id in source_ids {
            if let Some(input) = PcrInput::from_state(state, *source_id)? {
                inputs.push(input);
            }
        }
        debug!("Fetching PCR details for {} sources", inputs.len());
        inputs
            .par_iter()
            .map(|input| {
                let ((fwd, rvs), heterodimer) = rayon::join(
                    || {
                        rayon::join(
                            || self.pcr_primer_details(backend, &input.fwd),
                            || self.pcr_primer_details(backend, &input.rvs),
                        )
                    },
                    || {
                        self.heterodimer_details(
                            backend,
                            &input.fwd.sequence,
                            &input.rvs.sequence,
                        )
                    },
                );
                Ok(PcrDetails {
                    source_id: input.source_id,
                    fwd_primer: fwd?,
                    rvs_primer: rvs?,
                    heterodimer: Some(heterodimer?),
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()
            .map_err(|e| {
                let err = CloneError::from(e);
                CloneError::new(
                    err.code,
                    format!("Could not retrieve PCR details: {}", err.message),
                )
            })
    }
}

struct PcrPrimerInput {
    id: PrimerId,
    name: String,
    sequence: String,
    binding_length: usize,
}

impl PcrPrimerInput {
    fn from_binding(state: &CloningState, binding: &PrimerBinding) -> Result<Self, CloneError> {
        let primer = state.primer(binding.primer_id)?;
        Ok(Self {
            id: primer.id,
            name: primer.name.clone(),
            sequence: primer.sequence.clone(),
            binding_length: binding
                .binding_length
                .unwrap_or(primer.sequence.len())
                .min(primer.sequence.len()),
        })
    }
}

struct PcrInput {
    source_id: SourceId,
    fwd: PcrPrimerInput,
    rvs: PcrPrimerInput,
}

impl PcrInput {
    fn from_state(state: &CloningState, source_id: SourceId) -> Result<Option<Self>, CloneError> {
        let source = state.source(source_id)?;
        let SourceKind::Pcr {
            forward_primer: Some(fwd),
            reverse_primer: Some(rvs),
            ..
        } = &source.kind
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            source_id,
            fwd: PcrPrimerInput::from_binding(state, fwd)?,
            rvs: PcrPrimerInput::from_binding(state, rvs)?,
        }))
    }
}
