//! The primer designer: one [`DesignSession`] per design, walking through
//! region selection for every fragment, the settings step and the results
//! step, then committing the primers into the cloning graph.
//!
//! Design requests are split into [`DesignSession::begin_submit`] and
//! [`DesignSession::finish_submit`] so the request can run elsewhere. Any
//! change to the inputs in between supersedes the ticket; its result is then
//! dropped.

use crate::{
    assembly::{
        DEFAULT_SPACER_LABEL, FragmentJoin, Orientation, add_translation_frame_features,
        join_sequences_into_single_sequence, simulate_homologous_recombination,
    },
    backend::{BackendClient, BackendError},
    cloning_graph::{CloningState, GraphUpdate, PrimerBinding, SequenceId, SourceId},
    design::{DesignType, FragmentRole},
    dna_sequence::SequenceRecord,
    edit_buffer::{Debouncer, EditState, PendingEdit},
    error::CloneError,
    iupac_code::is_dna,
    region::{Region, Selection, region_to_location_string},
};
use cloneplan_protocol::{
    DesignRequest, DesignResponse, LocatedSequence, PcrTemplate, Primer, PrimerDesignSettings,
    PrimerId,
};
use log::{debug, info, warn};
use std::{collections::HashSet, time::Instant};

pub const PREVIEW_NAME: &str = "primer_design_product";

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSlot {
    pub sequence_id: SequenceId,
    pub region: Option<Region>,
    pub orientation: Orientation,
    pub role: FragmentRole,
}

impl FragmentSlot {
    pub fn is_satisfied(&self) -> bool {
        self.role == FragmentRole::WholeSequence || self.region.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Selecting the region of fragment `i`
    Region(usize),
    Settings,
    Results,
}

/// An issued design request. Only the latest ticket can finish a submit.
#[derive(Debug, Clone)]
pub struct DesignTicket {
    pub generation: u64,
    pub request: DesignRequest,
}

pub struct DesignSession {
    design: DesignType,
    fragments: Vec<FragmentSlot>,
    spacers: Vec<String>,
    spacer_edits: Vec<PendingEdit<String>>,
    primer_settings: PrimerDesignSettings,
    tab: usize,
    primers: Vec<Primer>,
    error: Option<String>,
    generation: u64,
    in_flight: Option<u64>,
    committed: bool,
    preview: Option<SequenceRecord>,
    /// Latest input change the preview has not been rescheduled for.
    changed_at: Option<Instant>,
    preview_timer: Debouncer,
}

impl DesignSession {
    pub fn new(design: DesignType, templates: &[SequenceId]) -> Result<Self, CloneError> {
        let roles = design.fragment_roles(templates.len())?;
        let fragments: Vec<FragmentSlot> = templates
            .iter()
            .zip(roles)
            .map(|(sequence_id, role)| FragmentSlot {
                sequence_id: *sequence_id,
                region: None,
                orientation: Orientation::Forward,
                role,
            })
            .collect();
        let n_spacers = design.spacer_count(fragments.len());
        Ok(Self {
            design,
            fragments,
            spacers: vec![String::new(); n_spacers],
            spacer_edits: vec![PendingEdit::default(); n_spacers],
            primer_settings: PrimerDesignSettings::default(),
            tab: 0,
            primers: vec![],
            error: None,
            generation: 0,
            in_flight: None,
            committed: false,
            preview: None,
            changed_at: Some(Instant::now()),
            preview_timer: Debouncer::default(),
        })
    }

    pub fn design(&self) -> &DesignType {
        &self.design
    }

    pub fn fragments(&self) -> &[FragmentSlot] {
        &self.fragments
    }

    /// Committed spacer values.
    pub fn spacers(&self) -> &[String] {
        &self.spacers
    }

    /// Spacer `idx` as the user sees it, including an unsettled edit.
    pub fn spacer(&self, idx: usize) -> Option<&str> {
        let committed = self.spacers.get(idx)?;
        Some(self.spacer_edits[idx].current(committed).as_str())
    }

    pub fn primer_settings(&self) -> &PrimerDesignSettings {
        &self.primer_settings
    }

    pub fn primers(&self) -> &[Primer] {
        &self.primers
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn preview(&self) -> Option<&SequenceRecord> {
        self.preview.as_ref()
    }

    pub fn tab(&self) -> usize {
        self.tab
    }

    fn settings_tab(&self) -> usize {
        self.fragments.len()
    }

    pub fn step(&self) -> Step {
        let k = self.settings_tab();
        match self.tab {
            tab if tab < k => Step::Region(tab),
            tab if tab == k => Step::Settings,
            _ => Step::Results,
        }
    }

    /// Inputs changed now. Setters without a `now` argument use the wall
    /// clock.
    fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Inputs changed at `at`: the preview is stale, a running request is
    /// superseded and earlier results no longer apply.
    fn touch_at(&mut self, at: Instant) {
        self.changed_at = Some(self.changed_at.map_or(at, |prev| prev.max(at)));
        self.generation += 1;
        if self.in_flight.take().is_some() {
            debug!("Design inputs changed, superseding the running request");
        }
        if !self.primers.is_empty() {
            self.primers.clear();
            self.tab = self.tab.min(self.settings_tab());
        }
    }

    fn ensure_open(&self) -> Result<(), CloneError> {
        if self.committed {
            return Err(CloneError::invalid_input(
                "This design has already been committed",
            ));
        }
        Ok(())
    }

    fn slot_mut(&mut self, idx: usize) -> Result<&mut FragmentSlot, CloneError> {
        let n = self.fragments.len();
        self.fragments
            .get_mut(idx)
            .ok_or_else(|| {
                CloneError::invalid_input(format!("No fragment {idx} in a {n} fragment design"))
            })
    }

    /// Takes the viewer selection for the active region step and moves on.
    pub fn confirm_region(
        &mut self,
        state: &CloningState,
        selection: &Selection,
    ) -> Result<(), CloneError> {
        self.ensure_open()?;
        let Step::Region(idx) = self.step() else {
            return Err(CloneError::invalid_input("No region is being selected"));
        };
        let slot = &self.fragments[idx];
        if slot.role != FragmentRole::WholeSequence {
            let region = selection.to_region(slot.role == FragmentRole::InsertionTarget)?;
            check_region(state.sequence(slot.sequence_id)?, &region)?;
            self.fragments[idx].region = Some(region);
            self.touch();
        }
        self.tab += 1;
        Ok(())
    }

    pub fn set_tab(&mut self, tab: usize) -> Result<(), CloneError> {
        let k = self.settings_tab();
        if tab > k + 1 {
            return Err(CloneError::invalid_input(format!("There is no tab {tab}")));
        }
        if let Some(idx) = (0..tab.min(k)).find(|idx| !self.fragments[*idx].is_satisfied()) {
            return Err(CloneError::invalid_input(format!(
                "Select a region for fragment {} first",
                idx + 1
            )));
        }
        if tab == k + 1 && self.primers.is_empty() {
            return Err(CloneError::invalid_input("Design the primers first"));
        }
        self.tab = tab;
        Ok(())
    }

    pub fn set_orientation(
        &mut self,
        idx: usize,
        orientation: Orientation,
    ) -> Result<(), CloneError> {
        self.ensure_open()?;
        let slot = self.slot_mut(idx)?;
        if slot.role == FragmentRole::InsertionTarget {
            return Err(CloneError::invalid_input(
                "The recombination target cannot be inverted",
            ));
        }
        if slot.orientation != orientation {
            slot.orientation = orientation;
            self.touch();
        }
        Ok(())
    }

    /// Gibson fragments can be used as they are instead of being amplified.
    pub fn set_amplified(&mut self, idx: usize, amplified: bool) -> Result<(), CloneError> {
        self.ensure_open()?;
        if !self.design.allows_whole_sequences() {
            return Err(CloneError::invalid_input(format!(
                "All fragments of a {} design are amplified",
                self.design.name()
            )));
        }
        let slot = self.slot_mut(idx)?;
        let role = if amplified {
            FragmentRole::Amplified
        } else {
            FragmentRole::WholeSequence
        };
        if slot.role != role {
            slot.role = role;
            slot.region = None;
            self.touch();
        }
        Ok(())
    }

    pub fn set_circular_assembly(&mut self, circular: bool) -> Result<(), CloneError> {
        self.ensure_open()?;
        let DesignType::GibsonAssembly(settings) = &self.design else {
            return Err(CloneError::invalid_input(format!(
                "A {} design has no circular option",
                self.design.name()
            )));
        };
        let mut settings = settings.clone();
        settings.circular = circular;
        self.set_design(DesignType::GibsonAssembly(settings))
    }

    /// Replaces the settings. The design type itself cannot change.
    pub fn set_design(&mut self, design: DesignType) -> Result<(), CloneError> {
        self.ensure_open()?;
        if design.name() != self.design.name() {
            return Err(CloneError::invalid_input(format!(
                "Cannot turn a {} design into a {} design",
                self.design.name(),
                design.name()
            )));
        }
        if design == self.design {
            return Ok(());
        }
        self.design = design;
        self.resize_spacers();
        self.touch();
        Ok(())
    }

    pub fn set_primer_settings(
        &mut self,
        settings: PrimerDesignSettings,
    ) -> Result<(), CloneError> {
        self.ensure_open()?;
        if settings != self.primer_settings {
            self.primer_settings = settings;
            self.touch();
        }
        Ok(())
    }

    /// The leading spacer only exists for linear assemblies.
    fn resize_spacers(&mut self) {
        let wanted = self.design.spacer_count(self.fragments.len());
        while self.spacers.len() > wanted {
            self.spacers.remove(0);
            self.spacer_edits.remove(0);
        }
        while self.spacers.len() < wanted {
            self.spacers.insert(0, String::new());
            self.spacer_edits.insert(0, PendingEdit::default());
        }
    }

    /// Records a keystroke in spacer `idx`; it is applied by
    /// [`Self::settle_edits`] once typing pauses.
    pub fn edit_spacer(&mut self, idx: usize, text: &str, now: Instant) -> Result<(), CloneError> {
        self.ensure_open()?;
        let n = self.spacers.len();
        let edit = self.spacer_edits.get_mut(idx).ok_or_else(|| {
            CloneError::invalid_input(format!("No spacer {idx}, this design has {n}"))
        })?;
        edit.edit(text.to_string(), now);
        Ok(())
    }

    /// `take` hands out an edit's value and the moment it went upstream.
    fn apply_spacer_edits(
        &mut self,
        mut take: impl FnMut(&mut PendingEdit<String>) -> Option<(String, Instant)>,
    ) -> bool {
        let mut changed_at: Option<Instant> = None;
        let spacers = self.spacers.iter_mut().zip(self.spacer_edits.iter_mut());
        for (spacer, edit) in spacers {
            if let Some((value, at)) = take(edit) {
                if *spacer != value {
                    changed_at = Some(changed_at.map_or(at, |prev| prev.max(at)));
                }
                *spacer = value;
                edit.acknowledge(spacer);
            }
        }
        if let Some(at) = changed_at {
            self.touch_at(at);
        }
        changed_at.is_some()
    }

    /// Applies spacer edits that have settled. True if a spacer changed.
    /// A settled spacer counts as changed when its edit settled, not at `now`.
    pub fn settle_edits(&mut self, now: Instant) -> bool {
        self.apply_spacer_edits(|edit| {
            let settled_at = match edit.state() {
                EditState::Editing { settle_at, .. } => *settle_at,
                _ => now,
            };
            edit.poll(now).map(|value| (value, settled_at))
        })
    }

    pub fn flush_edits(&mut self) -> bool {
        let now = Instant::now();
        self.apply_spacer_edits(|edit| edit.flush().map(|value| (value, now)))
    }

    /// Everything that keeps the design from being submitted.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = vec![];
        for (idx, slot) in self.fragments.iter().enumerate() {
            if slot.is_satisfied() {
                continue;
            }
            errors.push(match slot.role {
                FragmentRole::InsertionTarget => {
                    "Select where to insert in the target sequence".to_string()
                }
                _ => format!("Select a region for fragment {}", idx + 1),
            });
        }
        if !self
            .fragments
            .iter()
            .any(|slot| slot.role == FragmentRole::Amplified)
        {
            errors.push("At least one fragment must be amplified".to_string());
        }
        errors.extend(self.design.settings_errors());
        for idx in 0..self.spacers.len() {
            if !self.spacer(idx).is_some_and(is_dna) {
                errors.push(format!("Spacer {} is not a valid DNA sequence", idx + 1));
            }
        }
        errors
    }

    pub fn can_submit(&self) -> bool {
        !self.committed && self.in_flight.is_none() && self.validation_errors().is_empty()
    }

    fn location_of(
        state: &CloningState,
        slot: &FragmentSlot,
    ) -> Result<Option<String>, CloneError> {
        let len = state.sequence(slot.sequence_id)?.len();
        Ok(slot
            .region
            .as_ref()
            .map(|region| region_to_location_string(region, len)))
    }

    pub fn build_request(&self, state: &CloningState) -> Result<DesignRequest, CloneError> {
        let mut templates = vec![];
        let mut target = None;
        for slot in &self.fragments {
            let sequence = state.sequence_entity(slot.sequence_id)?;
            let location = Self::location_of(state, slot)?;
            match slot.role {
                FragmentRole::InsertionTarget => {
                    target = Some(LocatedSequence {
                        sequence,
                        location: location.ok_or_else(|| {
                            CloneError::invalid_input("The target has no insertion region")
                        })?,
                    });
                }
                FragmentRole::Amplified | FragmentRole::WholeSequence => {
                    templates.push(PcrTemplate {
                        sequence,
                        location: match slot.role {
                            FragmentRole::WholeSequence => None,
                            _ => location,
                        },
                        forward_orientation: slot.orientation.is_forward(),
                    });
                }
            }
        }
        self.design.build_request(
            templates,
            target,
            self.spacers.clone(),
            self.primer_settings.clone(),
        )
    }

    /// Validates, builds the request and marks it as running.
    pub fn begin_submit(&mut self, state: &CloningState) -> Result<DesignTicket, CloneError> {
        self.ensure_open()?;
        self.flush_edits();
        if self.in_flight.is_some() {
            return Err(CloneError::invalid_input(
                "A design request is already running",
            ));
        }
        let errors = self.validation_errors();
        if !errors.is_empty() {
            return Err(CloneError::invalid_input(errors.join("; ")));
        }
        let request = self.build_request(state)?;
        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.error = None;
        debug!(
            "Submitting {} design, generation {}",
            self.design.name(),
            self.generation
        );
        Ok(DesignTicket {
            generation: self.generation,
            request,
        })
    }

    /// Applies a design result. Returns false if the ticket was superseded
    /// and the result was dropped.
    pub fn finish_submit(
        &mut self,
        ticket: &DesignTicket,
        result: Result<DesignResponse, BackendError>,
    ) -> bool {
        if self.in_flight != Some(ticket.generation) {
            debug!(
                "Dropping stale design response for generation {}",
                ticket.generation
            );
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(response) if response.primers.is_empty() || response.primers.len() % 2 != 0 => {
                warn!("Backend returned {} primers", response.primers.len());
                self.error = Some("Internal error: unexpected error response".to_string());
            }
            Ok(response) => {
                info!(
                    "{} design returned {} primers",
                    self.design.name(),
                    response.primers.len()
                );
                self.primers = response.primers;
                self.error = None;
                self.tab = self.settings_tab() + 1;
            }
            Err(err) => {
                warn!("{} design failed: {err:?}", self.design.name());
                self.error = Some(err.to_display_string());
                self.tab = self.settings_tab();
            }
        }
        true
    }

    /// Submits and waits for the backend. Backend failures end up in
    /// [`Self::error`]; only validation problems are returned.
    pub fn submit(
        &mut self,
        backend: &dyn BackendClient,
        state: &CloningState,
    ) -> Result<(), CloneError> {
        let ticket = self.begin_submit(state)?;
        let result = backend.design_primers(&ticket.request);
        self.finish_submit(&ticket, result);
        Ok(())
    }

    /// Adds the designed primers to the graph and puts each forward/reverse
    /// pair on the PCR source of its fragment, in one batch.
    pub fn commit(&mut self, state: &mut CloningState) -> Result<Vec<PrimerId>, CloneError> {
        self.ensure_open()?;
        if self.primers.is_empty() || self.primers.len() % 2 != 0 {
            return Err(CloneError::invalid_input(
                "There are no primer pairs to commit",
            ));
        }
        let ids = state.reserve_ids(self.primers.len());
        let mut taken = HashSet::new();
        let mut updates = vec![];
        for (primer, id) in self.primers.iter().zip(ids.iter()) {
            let name = state.unique_primer_name(&primer.name, &taken);
            taken.insert(name.clone());
            updates.push(GraphUpdate::AddPrimer(Primer {
                id: *id,
                name,
                sequence: primer.sequence.clone(),
                database_id: primer.database_id,
            }));
        }

        let n_pairs = self.primers.len() / 2;
        let pair_for_source = self.pair_assignments(state, n_pairs)?;
        for (source_id, pair) in pair_for_source {
            updates.push(GraphUpdate::SetPcrPrimers {
                source_id,
                forward: PrimerBinding::new(ids[2 * pair]),
                reverse: PrimerBinding::new(ids[2 * pair + 1]),
            });
        }
        updates.push(GraphUpdate::SetMainSequence(None));

        state.apply_batch(updates)?;
        self.committed = true;
        info!("Committed {} primers", ids.len());
        Ok(ids)
    }

    /// Which primer pair goes onto which PCR source.
    fn pair_assignments(
        &self,
        state: &CloningState,
        n_pairs: usize,
    ) -> Result<Vec<(SourceId, usize)>, CloneError> {
        if let DesignType::Ebic(_) = self.design {
            // Every PCR of the template gets a pair, cycling through them
            let template = self.fragments[0].sequence_id;
            let sources = state.pcr_sources_for_template(template);
            if sources.is_empty() {
                return Err(CloneError::not_found(format!(
                    "No PCR uses sequence {template}"
                )));
            }
            return Ok(sources
                .into_iter()
                .enumerate()
                .map(|(j, source_id)| (source_id, j % n_pairs))
                .collect());
        }

        let amplified: Vec<&FragmentSlot> = self
            .fragments
            .iter()
            .filter(|slot| slot.role == FragmentRole::Amplified)
            .collect();
        if amplified.len() != n_pairs {
            return Err(CloneError::invalid_input(format!(
                "Expected {} primer pairs, got {n_pairs}",
                amplified.len()
            )));
        }
        let mut used = HashSet::new();
        let mut ret = vec![];
        for (pair, slot) in amplified.into_iter().enumerate() {
            let source_id = state
                .pcr_sources_for_template(slot.sequence_id)
                .into_iter()
                .find(|source_id| !used.contains(source_id))
                .ok_or_else(|| {
                    CloneError::not_found(format!("No PCR uses sequence {}", slot.sequence_id))
                })?;
            used.insert(source_id);
            ret.push((source_id, pair));
        }
        Ok(ret)
    }

    /// The product the design would build, or `None` while regions are
    /// missing.
    pub fn compute_preview(
        &self,
        state: &CloningState,
    ) -> Result<Option<SequenceRecord>, CloneError> {
        if !self.fragments.iter().all(FragmentSlot::is_satisfied) {
            return Ok(None);
        }
        let records = self
            .fragments
            .iter()
            .map(|slot| state.sequence(slot.sequence_id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut product = match &self.design {
            DesignType::HomologousRecombination(_) => {
                let rois: Vec<Region> =
                    self.fragments.iter().filter_map(|slot| slot.region).collect();
                simulate_homologous_recombination(
                    records[0],
                    records[1],
                    &rois,
                    !self.fragments[0].orientation.is_forward(),
                    &self.spacers,
                )?
            }
            design => {
                let joins: Vec<FragmentJoin> = self
                    .fragments
                    .iter()
                    .zip(records.iter())
                    .map(|(slot, record)| {
                        FragmentJoin::new(record, slot.region.as_ref(), slot.orientation)
                    })
                    .collect();
                let circular = design.circular_assembly();
                let mut product = join_sequences_into_single_sequence(
                    &joins,
                    &self.spacers,
                    circular,
                    DEFAULT_SPACER_LABEL,
                )?;
                if circular {
                    product.set_circular(true);
                }
                if let DesignType::GatewayBp(settings) = design {
                    if let (Some(frame), [left, right]) =
                        (settings.translation_frame, self.spacers.as_slice())
                    {
                        add_translation_frame_features(
                            &mut product,
                            left.len(),
                            right.len(),
                            frame,
                        );
                    }
                }
                product
            }
        };
        product.set_name(PREVIEW_NAME);
        Ok(Some(product))
    }

    /// Drives the debounced preview: settles spacer edits, then recomputes
    /// the preview once inputs have been quiet for the debounce delay since
    /// the last change, however late the poll comes.
    /// Returns true if the preview was recomputed.
    pub fn poll_preview(&mut self, now: Instant, state: &CloningState) -> bool {
        self.settle_edits(now);
        if let Some(changed_at) = self.changed_at.take() {
            self.preview_timer.schedule(changed_at);
        }
        if !self.preview_timer.fire(now) {
            return false;
        }
        self.preview = match self.compute_preview(state) {
            Ok(preview) => preview,
            Err(e) => {
                debug!("No preview: {e}");
                None
            }
        };
        true
    }
}

fn check_region(record: &SequenceRecord, region: &Region) -> Result<(), CloneError> {
    let len = record.len();
    match *region {
        Region::Insertion { caret } if caret > len => Err(CloneError::invalid_input(format!(
            "Position {caret} is outside of a {len} bp sequence"
        ))),
        Region::Range { start, end } if start >= len || end >= len => {
            Err(CloneError::invalid_input(format!(
                "Region {} - {} is outside of a {len} bp sequence",
                start + 1,
                end + 1
            )))
        }
        Region::Range { start, end } if start > end && !record.is_circular() => Err(
            CloneError::invalid_input("A region of a linear sequence cannot span the origin"),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::fake::FakeBackend,
        cloning_graph::SourceKind,
        design::{
            EbicSettings, GibsonSettings, HomologousRecombinationSettings, HybridizationSettings,
        },
        feature_location::{feature_kind, feature_label},
    };
    use cloneplan_protocol::DesignRequestBody;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn random_dna(len: usize, seed: usize) -> String {
        (0..len)
            .map(|i| ['A', 'C', 'G', 'T'][(i * 7 + seed * 3 + i / 5) % 4])
            .collect()
    }

    /// A state with one PCR source per template.
    fn state_with_templates(lengths: &[usize]) -> (CloningState, Vec<SequenceId>, Vec<SourceId>) {
        let mut state = CloningState::default();
        let mut sequences = vec![];
        let mut sources = vec![];
        for (idx, len) in lengths.iter().enumerate() {
            let mut record = SequenceRecord::from_sequence(&random_dna(*len, idx));
            record.set_name(&format!("template{idx}"));
            let id = state.add_sequence(record);
            sources.push(state.add_source(
                SourceKind::Pcr {
                    template: id,
                    forward_primer: None,
                    reverse_primer: None,
                },
                None,
            ));
            sequences.push(id);
        }
        (state, sequences, sources)
    }

    fn pcr_primers(state: &CloningState, source_id: SourceId) -> (Option<String>, Option<String>) {
        match &state.source(source_id).unwrap().kind {
            SourceKind::Pcr {
                forward_primer,
                reverse_primer,
                ..
            } => (
                forward_primer.map(|b| state.primer(b.primer_id).unwrap().name.clone()),
                reverse_primer.map(|b| state.primer(b.primer_id).unwrap().name.clone()),
            ),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_simple_pair_end_to_end() {
        let (mut state, sequences, sources) = state_with_templates(&[100]);
        let mut session =
            DesignSession::new(DesignType::SimplePair(HybridizationSettings::default()), &sequences)
                .unwrap();
        assert_eq!(session.step(), Step::Region(0));
        assert!(!session.can_submit());

        let selection: Selection = serde_json::from_str(
            r#"{"selectionLayer": {"start": 10, "end": 39}, "caretPosition": -1}"#,
        )
        .unwrap();
        session.confirm_region(&state, &selection).unwrap();
        assert_eq!(session.step(), Step::Settings);
        assert_eq!(session.spacers(), &["".to_string(), "".to_string()]);
        assert!(session.can_submit());

        let backend = FakeBackend::with_primers(&[("fwd", "ACGTACGTAC"), ("rvs", "GTACGTACGT")]);
        session.submit(&backend, &state).unwrap();
        let request = backend.last_request.lock().unwrap().clone().unwrap();
        match &request.body {
            DesignRequestBody::SimplePair {
                pcr_template,
                spacers,
                ..
            } => {
                assert_eq!(pcr_template.location.as_deref(), Some("11..40"));
                assert!(pcr_template.forward_orientation);
                assert_eq!(spacers, &vec![String::new(), String::new()]);
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(session.step(), Step::Results);
        assert_eq!(session.primers().len(), 2);

        let ids = session.commit(&mut state).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(
            pcr_primers(&state, sources[0]),
            (Some("fwd".to_string()), Some("rvs".to_string()))
        );
        assert!(session.is_committed());
        assert!(session.commit(&mut state).is_err());
    }

    #[test]
    fn test_gibson_submission_gating() {
        let (state, sequences, _) = state_with_templates(&[60, 60, 60]);
        let mut session =
            DesignSession::new(DesignType::GibsonAssembly(GibsonSettings::default()), &sequences)
                .unwrap();
        assert_eq!(session.spacers().len(), 3);

        session.confirm_region(&state, &Selection::range(0, 29)).unwrap();
        assert!(!session.can_submit());
        session.confirm_region(&state, &Selection::range(5, 40)).unwrap();
        assert!(!session.can_submit());
        session.set_amplified(2, false).unwrap();
        assert!(session.can_submit());

        session.edit_spacer(1, "ACGN", Instant::now()).unwrap();
        assert!(!session.can_submit());
        session.edit_spacer(1, "acgt", Instant::now()).unwrap();
        assert!(session.can_submit());

        session.set_circular_assembly(false).unwrap();
        assert_eq!(session.spacers().len(), 4);
        session.set_circular_assembly(true).unwrap();
        assert_eq!(session.spacers().len(), 3);
        assert!(
            DesignSession::new(DesignType::SimplePair(Default::default()), &sequences[..1])
                .unwrap()
                .set_circular_assembly(false)
                .is_err()
        );
    }

    #[test]
    fn test_region_steps() {
        let (state, sequences, _) = state_with_templates(&[50, 50]);
        let mut session =
            DesignSession::new(DesignType::GibsonAssembly(GibsonSettings::default()), &sequences)
                .unwrap();
        assert!(session.set_tab(2).is_err());
        assert!(session.confirm_region(&state, &Selection::caret(3)).is_err());
        // linear templates cannot wrap
        assert!(session.confirm_region(&state, &Selection::range(40, 3)).is_err());
        assert!(session.confirm_region(&state, &Selection::range(10, 50)).is_err());
        assert_eq!(session.step(), Step::Region(0));

        session.confirm_region(&state, &Selection::range(10, 20)).unwrap();
        session.set_tab(0).unwrap();
        assert_eq!(session.step(), Step::Region(0));
        assert!(session.set_tab(2).is_err());
        session.set_tab(1).unwrap();
        session.set_amplified(1, false).unwrap();
        session.confirm_region(&state, &Selection::caret(0)).unwrap();
        assert_eq!(session.step(), Step::Settings);
        assert!(session.set_tab(3).is_err());
    }

    #[test]
    fn test_backend_failure_keeps_inputs() {
        let (state, sequences, _) = state_with_templates(&[80]);
        let mut session =
            DesignSession::new(DesignType::SimplePair(Default::default()), &sequences).unwrap();
        session.confirm_region(&state, &Selection::range(5, 50)).unwrap();
        session.edit_spacer(0, "GAATTC", Instant::now()).unwrap();

        let backend = FakeBackend::default();
        session.submit(&backend, &state).unwrap();
        assert_eq!(session.error(), Some("Network error: Cannot connect to backend"));
        assert_eq!(session.step(), Step::Settings);
        assert_eq!(session.fragments()[0].region, Some(Region::Range { start: 5, end: 50 }));
        assert_eq!(session.spacers()[0], "GAATTC");
        assert!(session.commit(&mut state.clone()).is_err());

        *backend.design_result.lock().unwrap() = Some(Err(BackendError::Http {
            status: 400,
            description: Some("No suitable primers".to_string()),
        }));
        session.submit(&backend, &state).unwrap();
        assert_eq!(session.error(), Some("No suitable primers"));
        assert_eq!(backend.design_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let (state, sequences, _) = state_with_templates(&[80]);
        let mut session =
            DesignSession::new(DesignType::SimplePair(Default::default()), &sequences).unwrap();
        session.confirm_region(&state, &Selection::range(5, 50)).unwrap();
        let stale = session.begin_submit(&state).unwrap();
        assert!(session.is_loading());
        assert!(session.begin_submit(&state).is_err());

        session.set_orientation(0, Orientation::Reverse).unwrap();
        assert!(!session.is_loading());
        let fresh = session.begin_submit(&state).unwrap();
        let response = DesignResponse {
            primers: vec![
                Primer {
                    id: 0,
                    name: "a".to_string(),
                    sequence: "ACGT".to_string(),
                    database_id: None,
                },
                Primer {
                    id: 0,
                    name: "b".to_string(),
                    sequence: "TGCA".to_string(),
                    database_id: None,
                },
            ],
        };
        assert!(!session.finish_submit(&stale, Ok(response.clone())));
        assert!(session.primers().is_empty());
        assert!(session.finish_submit(&fresh, Ok(response)));
        assert_eq!(session.step(), Step::Results);
        match &fresh.request.body {
            DesignRequestBody::SimplePair { pcr_template, .. } => {
                assert!(!pcr_template.forward_orientation)
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_gibson_commit_skips_whole_fragments() {
        let (mut state, sequences, sources) = state_with_templates(&[40, 40, 40]);
        let mut session =
            DesignSession::new(DesignType::GibsonAssembly(GibsonSettings::default()), &sequences)
                .unwrap();
        session.set_amplified(1, false).unwrap();
        session.confirm_region(&state, &Selection::range(0, 39)).unwrap();
        session.confirm_region(&state, &Selection::range(0, 0)).unwrap();
        session.confirm_region(&state, &Selection::range(2, 30)).unwrap();
        assert_eq!(session.step(), Step::Settings);

        let request = session.build_request(&state).unwrap();
        let body = serde_json::to_value(&request.body).unwrap();
        assert_eq!(body["pcr_templates"][1]["location"], serde_json::Value::Null);
        assert_eq!(body["pcr_templates"][2]["location"], "3..31");
        assert!(request.query.contains(&("circular".to_string(), "true".to_string())));

        let backend = FakeBackend::with_primers(&[
            ("f0", "ACGTAC"),
            ("r0", "GTACGT"),
            ("f2", "TTACGT"),
            ("r2", "GGACGT"),
        ]);
        session.submit(&backend, &state).unwrap();
        session.commit(&mut state).unwrap();
        assert_eq!(
            pcr_primers(&state, sources[0]),
            (Some("f0".to_string()), Some("r0".to_string()))
        );
        assert_eq!(pcr_primers(&state, sources[1]), (None, None));
        assert_eq!(
            pcr_primers(&state, sources[2]),
            (Some("f2".to_string()), Some("r2".to_string()))
        );
    }

    #[test]
    fn test_ebic_commit_cycles_pairs() {
        let (mut state, sequences, sources) = state_with_templates(&[200]);
        let template = sequences[0];
        let extra: Vec<SourceId> = (0..2)
            .map(|_| {
                state.add_source(
                    SourceKind::Pcr {
                        template,
                        forward_primer: None,
                        reverse_primer: None,
                    },
                    None,
                )
            })
            .collect();
        let mut session =
            DesignSession::new(DesignType::Ebic(EbicSettings::default()), &sequences).unwrap();
        assert!(session.spacers().is_empty());
        session.confirm_region(&state, &Selection::range(50, 120)).unwrap();
        let backend = FakeBackend::with_primers(&[
            ("left_fwd", "ACGTAC"),
            ("left_rvs", "GTACGT"),
            ("right_fwd", "TTACGT"),
            ("right_rvs", "GGACGT"),
        ]);
        session.submit(&backend, &state).unwrap();
        session.commit(&mut state).unwrap();
        assert_eq!(pcr_primers(&state, sources[0]).0.as_deref(), Some("left_fwd"));
        assert_eq!(pcr_primers(&state, extra[0]).0.as_deref(), Some("right_fwd"));
        assert_eq!(pcr_primers(&state, extra[1]).1.as_deref(), Some("left_rvs"));
    }

    #[test]
    fn test_commit_without_pcr_is_atomic() {
        let mut state = CloningState::default();
        let template = state.add_sequence(SequenceRecord::from_sequence(&random_dna(60, 1)));
        let mut session =
            DesignSession::new(DesignType::SimplePair(Default::default()), &[template]).unwrap();
        session.confirm_region(&state, &Selection::range(0, 40)).unwrap();
        let backend = FakeBackend::with_primers(&[("fwd", "ACGTAC"), ("rvs", "GTACGT")]);
        session.submit(&backend, &state).unwrap();
        let err = session.commit(&mut state).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::NotFound);
        assert!(state.primers.is_empty());
        assert!(!session.is_committed());
    }

    #[test]
    fn test_commit_renames_clashing_primers() {
        let (mut state, sequences, _) = state_with_templates(&[60]);
        state.add_primer("fwd", "AAAAAA").unwrap();
        let mut session =
            DesignSession::new(DesignType::SimplePair(Default::default()), &sequences).unwrap();
        session.confirm_region(&state, &Selection::range(0, 40)).unwrap();
        let backend = FakeBackend::with_primers(&[("fwd", "ACGTAC"), ("rvs", "GTACGT")]);
        session.submit(&backend, &state).unwrap();
        session.commit(&mut state).unwrap();
        let names: Vec<&str> = state.primers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["fwd", "fwd_2", "rvs"]);
    }

    #[test]
    fn test_homologous_recombination_session() {
        let (state, sequences, _) = state_with_templates(&[40, 30]);
        let mut session = DesignSession::new(
            DesignType::HomologousRecombination(HomologousRecombinationSettings::default()),
            &sequences,
        )
        .unwrap();
        session.confirm_region(&state, &Selection::range(10, 19)).unwrap();
        session.confirm_region(&state, &Selection::caret(5)).unwrap();
        assert!(session.set_orientation(1, Orientation::Reverse).is_err());

        let request = session.build_request(&state).unwrap();
        let body = serde_json::to_value(&request.body).unwrap();
        assert_eq!(body["pcr_template"]["location"], "11..20");
        assert_eq!(body["homologous_recombination_target"]["location"], "5^6");

        let preview = session.compute_preview(&state).unwrap().unwrap();
        assert_eq!(preview.len(), 40);
        assert_eq!(preview.name(), Some(PREVIEW_NAME));
        let target = state.sequence(sequences[1]).unwrap().get_forward_string();
        let template = state.sequence(sequences[0]).unwrap().get_forward_string();
        assert_eq!(
            preview.get_forward_string(),
            format!("{}{}{}", &target[..5], &template[10..20], &target[5..])
        );
    }

    #[test]
    fn test_preview_is_debounced() {
        let (state, sequences, _) = state_with_templates(&[50, 50]);
        let mut session =
            DesignSession::new(DesignType::GibsonAssembly(GibsonSettings::default()), &sequences)
                .unwrap();
        session.confirm_region(&state, &Selection::range(0, 9)).unwrap();
        session.confirm_region(&state, &Selection::range(0, 19)).unwrap();
        let t0 = Instant::now();
        assert!(!session.poll_preview(t0, &state));
        assert!(session.poll_preview(t0 + ms(300), &state));
        assert_eq!(session.preview().unwrap().len(), 30);
        assert!(session.preview().unwrap().is_circular());

        session.edit_spacer(0, "GG", t0 + ms(400)).unwrap();
        assert!(!session.poll_preview(t0 + ms(500), &state));
        // the edit settles at 700, the preview follows 300 ms later
        assert!(!session.poll_preview(t0 + ms(700), &state));
        assert_eq!(session.spacers()[0], "GG");
        session.edit_spacer(1, "TT", t0 + ms(800)).unwrap();
        // an unsettled edit does not hold back the preview
        assert!(session.poll_preview(t0 + ms(1000), &state));
        assert_eq!(session.preview().unwrap().len(), 32);
        assert!(!session.poll_preview(t0 + ms(1100), &state));
        assert!(!session.poll_preview(t0 + ms(1300), &state));
        assert!(session.poll_preview(t0 + ms(1400), &state));

        let preview = session.preview().unwrap();
        assert_eq!(preview.len(), 34);
        let spacers: Vec<_> = preview
            .features()
            .iter()
            .filter(|f| feature_kind(f) == "misc_feature")
            .collect();
        assert_eq!(spacers.len(), 2);
        assert_eq!(feature_label(spacers[0]), Some(DEFAULT_SPACER_LABEL));
    }

    #[test]
    fn test_late_first_poll_counts_from_the_change() {
        let (state, sequences, _) = state_with_templates(&[50, 50]);
        let mut session =
            DesignSession::new(DesignType::GibsonAssembly(GibsonSettings::default()), &sequences)
                .unwrap();
        session.confirm_region(&state, &Selection::range(0, 9)).unwrap();
        session.confirm_region(&state, &Selection::range(0, 19)).unwrap();
        let t0 = Instant::now();
        assert!(session.poll_preview(t0 + ms(1000), &state));
        assert_eq!(session.preview().unwrap().len(), 30);

        // settles at 1400, so the preview is due at 1700
        session.edit_spacer(0, "GG", t0 + ms(1100)).unwrap();
        assert!(session.poll_preview(t0 + ms(2000), &state));
        assert_eq!(session.preview().unwrap().len(), 32);
        assert!(!session.poll_preview(t0 + ms(2500), &state));
    }

    #[test]
    fn test_gateway_preview_has_translation_frame() {
        let (state, sequences, _) = state_with_templates(&[60]);
        let mut session = DesignSession::new(
            DesignType::GatewayBp(crate::design::GatewayBpSettings {
                donor_vector: Some(99),
                translation_frame: Some([1, 1]),
                ..Default::default()
            }),
            &sequences,
        )
        .unwrap();
        session.confirm_region(&state, &Selection::range(0, 29)).unwrap();
        let t0 = Instant::now();
        session.edit_spacer(0, "ACAAGTTTG", t0).unwrap();
        session.edit_spacer(1, "ACCACTTTGT", t0).unwrap();
        session.flush_edits();
        let preview = session.compute_preview(&state).unwrap().unwrap();
        assert_eq!(preview.len(), 49);
        let frames: Vec<_> = preview
            .features()
            .iter()
            .filter(|f| feature_kind(f) == "CDS")
            .collect();
        assert_eq!(frames.len(), 2);
    }
}
