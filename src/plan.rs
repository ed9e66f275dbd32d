//! A whole primer-design session written down as JSON, for scripted use.
//!
//! ```json
//! {
//!   "design": {"design_type": "simple_pair", "settings": {}},
//!   "fragments": [
//!     {"sequence_id": 1, "region": {"selectionLayer": {"start": 10, "end": 39}}}
//!   ],
//!   "spacers": ["", ""]
//! }
//! ```

use crate::{
    assembly::Orientation,
    cloning_graph::{CloningState, SequenceId},
    design::DesignType,
    error::CloneError,
    region::{Region, Selection},
    session::DesignSession,
};
use cloneplan_protocol::PrimerDesignSettings;
use serde::{Deserialize, Serialize};
use std::time::Instant;

fn amplified_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFragment {
    pub sequence_id: SequenceId,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default = "amplified_by_default")]
    pub amplified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPlan {
    pub design: DesignType,
    pub fragments: Vec<PlanFragment>,
    /// Empty keeps the session's all-empty spacers
    #[serde(default)]
    pub spacers: Vec<String>,
    #[serde(default)]
    pub primer_settings: Option<PrimerDesignSettings>,
}

impl DesignPlan {
    pub fn from_json(text: &str) -> Result<Self, CloneError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Replays the plan through a session, which ends on the settings step.
    pub fn into_session(&self, state: &CloningState) -> Result<DesignSession, CloneError> {
        let ids: Vec<SequenceId> = self.fragments.iter().map(|f| f.sequence_id).collect();
        let mut session = DesignSession::new(self.design.clone(), &ids)?;
        for (idx, fragment) in self.fragments.iter().enumerate() {
            if !fragment.amplified {
                session.set_amplified(idx, false)?;
            }
            if fragment.orientation != Orientation::Forward {
                session.set_orientation(idx, fragment.orientation)?;
            }
        }
        for (idx, fragment) in self.fragments.iter().enumerate() {
            let selection = match (fragment.region, fragment.amplified) {
                (Some(region), _) => Selection::from(region),
                (None, false) => Selection {
                    selection_layer: None,
                    caret_position: -1,
                },
                (None, true) => {
                    return Err(CloneError::invalid_input(format!(
                        "Fragment {} needs a region",
                        idx + 1
                    )));
                }
            };
            session.confirm_region(state, &selection)?;
        }
        if !self.spacers.is_empty() {
            if self.spacers.len() != session.spacers().len() {
                return Err(CloneError::invalid_input(format!(
                    "This design takes {} spacers, the plan has {}",
                    session.spacers().len(),
                    self.spacers.len()
                )));
            }
            let now = Instant::now();
            for (idx, spacer) in self.spacers.iter().enumerate() {
                session.edit_spacer(idx, spacer, now)?;
            }
            session.flush_edits();
        }
        if let Some(settings) = &self.primer_settings {
            session.set_primer_settings(settings.clone())?;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dna_sequence::SequenceRecord, session::Step};

    fn state() -> (CloningState, SequenceId, SequenceId) {
        let mut state = CloningState::default();
        let a = state.add_sequence(SequenceRecord::from_sequence(&"ACGT".repeat(25)));
        let b = state.add_sequence(SequenceRecord::from_sequence(&"GGCC".repeat(10)));
        (state, a, b)
    }

    #[test]
    fn test_simple_pair_plan() {
        let (state, a, _) = state();
        let plan = DesignPlan::from_json(&format!(
            r#"{{"design": {{"design_type": "simple_pair", "settings": {{}}}},
                "fragments": [{{"sequence_id": {a},
                    "region": {{"selectionLayer": {{"start": 10, "end": 39}},
                               "caretPosition": -1}}}}],
                "spacers": ["GAATTC", ""]}}"#
        ))
        .unwrap();
        let session = plan.into_session(&state).unwrap();
        assert_eq!(session.step(), Step::Settings);
        assert_eq!(session.spacers()[0], "GAATTC");
        assert!(session.can_submit());
    }

    #[test]
    fn test_gibson_plan_with_whole_fragment() {
        let (state, a, b) = state();
        let plan = DesignPlan {
            design: DesignType::GibsonAssembly(Default::default()),
            fragments: vec![
                PlanFragment {
                    sequence_id: a,
                    region: Some(Region::Range { start: 0, end: 49 }),
                    orientation: Orientation::Reverse,
                    amplified: true,
                },
                PlanFragment {
                    sequence_id: b,
                    region: None,
                    orientation: Orientation::Forward,
                    amplified: false,
                },
            ],
            spacers: vec![],
            primer_settings: None,
        };
        let session = plan.into_session(&state).unwrap();
        assert_eq!(session.fragments()[0].orientation, Orientation::Reverse);
        assert!(session.can_submit());
        let preview = session.compute_preview(&state).unwrap().unwrap();
        assert_eq!(preview.len(), 90);
    }

    #[test]
    fn test_plan_errors() {
        let (state, a, _) = state();
        let mut plan = DesignPlan {
            design: DesignType::SimplePair(Default::default()),
            fragments: vec![PlanFragment {
                sequence_id: a,
                region: None,
                orientation: Orientation::Forward,
                amplified: true,
            }],
            spacers: vec![],
            primer_settings: None,
        };
        assert!(plan.into_session(&state).is_err());
        plan.fragments[0].region = Some(Region::Range { start: 0, end: 9 });
        plan.spacers = vec!["A".to_string()];
        assert!(plan.into_session(&state).is_err());
    }
}
