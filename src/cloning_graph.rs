//! The cloning graph: sequences, the sources that produced them, and primers.
//!
//! Readers borrow the state directly; writers go through [`GraphUpdate`]
//! batches so a design commit is applied as one state transition.

use crate::{
    dna_sequence::SequenceRecord,
    error::{CloneError, ErrorCode},
    iupac_code::is_dna,
};
use cloneplan_protocol::{Primer, PrimerId, SequenceEntity};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub type SequenceId = u64;
pub type SourceId = u64;

/// A primer as used by a PCR: only the 3' `binding_length` bases hybridize
/// with the template. `None` means the whole primer binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimerBinding {
    pub primer_id: PrimerId,
    #[serde(default)]
    pub binding_length: Option<usize>,
}

impl PrimerBinding {
    pub fn new(primer_id: PrimerId) -> Self {
        Self {
            primer_id,
            binding_length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    Pcr {
        template: SequenceId,
        #[serde(default)]
        forward_primer: Option<PrimerBinding>,
        #[serde(default)]
        reverse_primer: Option<PrimerBinding>,
    },
    HomologousRecombination {
        template: SequenceId,
        target: SequenceId,
    },
    Other {
        #[serde(default)]
        inputs: Vec<SequenceId>,
        #[serde(default)]
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    #[serde(flatten)]
    pub kind: SourceKind,
    #[serde(default)]
    pub output: Option<SequenceId>,
}

impl Source {
    pub fn pcr_template(&self) -> Option<SequenceId> {
        match self.kind {
            SourceKind::Pcr { template, .. } => Some(template),
            _ => None,
        }
    }
}

/// One change to the graph. See [`CloningState::apply_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphUpdate {
    AddPrimer(Primer),
    SetPcrPrimers {
        source_id: SourceId,
        forward: PrimerBinding,
        reverse: PrimerBinding,
    },
    SetMainSequence(Option<SequenceId>),
}

fn first_id() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloningState {
    #[serde(default)]
    pub sequences: BTreeMap<SequenceId, SequenceRecord>,
    #[serde(default)]
    pub primers: Vec<Primer>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub main_sequence_id: Option<SequenceId>,
    /// Shared by sequences, sources and primers.
    #[serde(default = "first_id")]
    pub next_id: u64,
}

impl Default for CloningState {
    fn default() -> Self {
        Self {
            sequences: BTreeMap::new(),
            primers: vec![],
            sources: vec![],
            main_sequence_id: None,
            next_id: first_id(),
        }
    }
}

impl CloningState {
    pub fn load_from_path(path: &str) -> Result<Self, CloneError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CloneError::new(
                ErrorCode::Io,
                format!("Could not read state file '{path}': {e}"),
            )
        })?;
        let state: Self = serde_json::from_str(&text).map_err(|e| {
            CloneError::invalid_input(format!("Could not parse state JSON '{path}': {e}"))
        })?;
        if let Some(primer) = state.primers.iter().find(|p| !is_dna(&p.sequence)) {
            return Err(CloneError::invalid_input(format!(
                "Primer '{}' in '{path}' is not a DNA sequence",
                primer.name
            )));
        }
        Ok(state)
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), CloneError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            CloneError::new(ErrorCode::Internal, format!("Could not serialize state: {e}"))
        })?;
        std::fs::write(path, text).map_err(|e| {
            CloneError::new(
                ErrorCode::Io,
                format!("Could not write state file '{path}': {e}"),
            )
        })
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_sequence(&mut self, record: SequenceRecord) -> SequenceId {
        let id = self.allocate_id();
        self.sequences.insert(id, record);
        id
    }

    pub fn add_source(&mut self, kind: SourceKind, output: Option<SequenceId>) -> SourceId {
        let id = self.allocate_id();
        self.sources.push(Source { id, kind, output });
        id
    }

    /// Adds a primer outside of a batch, e.g. when importing a primer list.
    pub fn add_primer(&mut self, name: &str, sequence: &str) -> Result<PrimerId, CloneError> {
        let primer = Primer {
            id: self.next_id,
            name: name.to_string(),
            sequence: sequence.to_string(),
            database_id: None,
        };
        let id = primer.id;
        self.apply_batch(vec![GraphUpdate::AddPrimer(primer)])?;
        Ok(id)
    }

    /// Ids the next `n` allocations will use, without allocating them.
    pub fn reserve_ids(&self, n: usize) -> Vec<u64> {
        (self.next_id..self.next_id + n as u64).collect()
    }

    pub fn sequence(&self, id: SequenceId) -> Result<&SequenceRecord, CloneError> {
        self.sequences
            .get(&id)
            .ok_or_else(|| CloneError::not_found(format!("Sequence '{id}' not found")))
    }

    pub fn source(&self, id: SourceId) -> Result<&Source, CloneError> {
        self.sources
            .iter()
            .find(|source| source.id == id)
            .ok_or_else(|| CloneError::not_found(format!("Source '{id}' not found")))
    }

    pub fn primer(&self, id: PrimerId) -> Result<&Primer, CloneError> {
        self.primers
            .iter()
            .find(|primer| primer.id == id)
            .ok_or_else(|| CloneError::not_found(format!("Primer '{id}' not found")))
    }

    /// PCR sources amplifying `template`, in graph order.
    pub fn pcr_sources_for_template(&self, template: SequenceId) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|source| source.pcr_template() == Some(template))
            .map(|source| source.id)
            .collect()
    }

    /// `base` if no primer uses that name yet, else `base_2`, `base_3`, ...
    pub fn unique_primer_name(&self, base: &str, taken: &HashSet<String>) -> String {
        let in_use = |name: &str| {
            taken.contains(name) || self.primers.iter().any(|primer| primer.name == name)
        };
        if !in_use(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|name| !in_use(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// The backend representation of a sequence.
    pub fn sequence_entity(&self, id: SequenceId) -> Result<SequenceEntity, CloneError> {
        let mut record = self.sequence(id)?.clone();
        // GenBank needs a LOCUS name
        if record.name().is_none_or(|name| name.trim().is_empty()) {
            record.set_name(&format!("seq_{id}"));
        }
        let genbank = record.to_genbank_string().map_err(|e| {
            CloneError::new(
                ErrorCode::Internal,
                format!("Could not write sequence '{id}' as GenBank: {e}"),
            )
        })?;
        Ok(SequenceEntity::genbank(id, genbank))
    }

    /// Applies all updates, or none of them if one fails.
    pub fn apply_batch(&mut self, updates: Vec<GraphUpdate>) -> Result<(), CloneError> {
        let mut next = self.clone();
        for update in updates.iter() {
            next.apply_one(update)?;
        }
        debug!("Applied {} graph updates", updates.len());
        *self = next;
        Ok(())
    }

    fn apply_one(&mut self, update: &GraphUpdate) -> Result<(), CloneError> {
        match update {
            GraphUpdate::AddPrimer(primer) => {
                if primer.name.trim().is_empty() {
                    return Err(CloneError::invalid_input("Primer name cannot be empty"));
                }
                if primer.sequence.is_empty() || !is_dna(&primer.sequence) {
                    return Err(CloneError::invalid_input(format!(
                        "Primer '{}' is not a DNA sequence",
                        primer.name
                    )));
                }
                if self.primers.iter().any(|p| p.name == primer.name) {
                    return Err(CloneError::invalid_input(format!(
                        "A primer named '{}' already exists",
                        primer.name
                    )));
                }
                if self.primers.iter().any(|p| p.id == primer.id)
                    || self.sequences.contains_key(&primer.id)
                    || self.sources.iter().any(|s| s.id == primer.id)
                {
                    return Err(CloneError::invalid_input(format!(
                        "Id {} is already in use",
                        primer.id
                    )));
                }
                self.next_id = self.next_id.max(primer.id + 1);
                self.primers.push(primer.clone());
            }
            GraphUpdate::SetPcrPrimers {
                source_id,
                forward,
                reverse,
            } => {
                self.primer(forward.primer_id)?;
                self.primer(reverse.primer_id)?;
                let source = self
                    .sources
                    .iter_mut()
                    .find(|source| source.id == *source_id)
                    .ok_or_else(|| {
                        CloneError::not_found(format!("Source '{source_id}' not found"))
                    })?;
                match &mut source.kind {
                    SourceKind::Pcr {
                        forward_primer,
                        reverse_primer,
                        ..
                    } => {
                        *forward_primer = Some(*forward);
                        *reverse_primer = Some(*reverse);
                    }
                    _ => {
                        return Err(CloneError::invalid_input(format!(
                            "Source '{source_id}' is not a PCR"
                        )));
                    }
                }
            }
            GraphUpdate::SetMainSequence(id) => {
                if let Some(id) = id {
                    self.sequence(*id)?;
                }
                self.main_sequence_id = *id;
            }
        }
        Ok(())
    }
}
