//! Primer design types. Each variant carries its own settings and knows
//! which backend endpoint it talks to and what it sends there.

use crate::error::CloneError;
use cloneplan_protocol::{
    DesignEndpoint, DesignRequest, DesignRequestBody, LocatedSequence, PcrTemplate,
    PrimerDesignSettings,
};
use serde::{Deserialize, Serialize};

pub const MIN_HOMOLOGY_LENGTH: usize = 20;
pub const MIN_HYBRIDIZATION_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentRole {
    /// Amplified by PCR from a selected region.
    Amplified,
    /// Used as a whole, without PCR. Needs no region.
    WholeSequence,
    /// Receives the insert; a single position is a valid region.
    InsertionTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridizationSettings {
    pub minimal_hybridization_length: usize,
    pub target_tm: f64,
}

impl Default for HybridizationSettings {
    fn default() -> Self {
        Self {
            minimal_hybridization_length: 20,
            target_tm: 55.0,
        }
    }
}

fn check_target_tm(target_tm: f64, errors: &mut Vec<String>) {
    if !(target_tm > 0.0 && target_tm < 100.0) {
        errors.push("Target melting temperature must be between 0 and 100 °C".to_string());
    }
}

fn check_homology_length(homology_length: usize, errors: &mut Vec<String>) {
    if homology_length < MIN_HOMOLOGY_LENGTH {
        errors.push(format!(
            "Homology length must be at least {MIN_HOMOLOGY_LENGTH} bp"
        ));
    }
}

impl HybridizationSettings {
    fn check(&self, errors: &mut Vec<String>) {
        if self.minimal_hybridization_length < MIN_HYBRIDIZATION_LENGTH {
            errors.push(format!(
                "Minimal hybridization length must be at least {MIN_HYBRIDIZATION_LENGTH} bp"
            ));
        }
        check_target_tm(self.target_tm, errors);
    }

    fn push_query(&self, query: &mut Vec<(String, String)>) {
        push(
            query,
            "minimal_hybridization_length",
            self.minimal_hybridization_length,
        );
        push(query, "target_tm", self.target_tm);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionLigationSettings {
    #[serde(flatten)]
    pub hybridization: HybridizationSettings,
    pub left_enzyme: Option<String>,
    pub right_enzyme: Option<String>,
    pub left_enzyme_inverted: bool,
    pub right_enzyme_inverted: bool,
    /// Extra bases 5' of the enzyme sites, so the enzymes can cut
    pub filler_bases: String,
}

impl Default for RestrictionLigationSettings {
    fn default() -> Self {
        Self {
            hybridization: HybridizationSettings::default(),
            left_enzyme: None,
            right_enzyme: None,
            left_enzyme_inverted: false,
            right_enzyme_inverted: false,
            filler_bases: "TTT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GibsonSettings {
    #[serde(flatten)]
    pub hybridization: HybridizationSettings,
    pub homology_length: usize,
    pub circular: bool,
}

impl Default for GibsonSettings {
    fn default() -> Self {
        Self {
            hybridization: HybridizationSettings::default(),
            homology_length: 35,
            circular: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomologousRecombinationSettings {
    #[serde(flatten)]
    pub hybridization: HybridizationSettings,
    pub homology_length: usize,
}

impl Default for HomologousRecombinationSettings {
    fn default() -> Self {
        Self {
            hybridization: HybridizationSettings::default(),
            homology_length: 80,
        }
    }
}

/// The attB sites go into the spacers. The donor vector only drives the
/// preview; the backend never sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayBpSettings {
    #[serde(flatten)]
    pub hybridization: HybridizationSettings,
    pub donor_vector: Option<u64>,
    /// `[left_offset, right_offset]` of the reading frame in the attB sites
    pub translation_frame: Option<[usize; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbicSettings {
    pub target_tm: f64,
    pub target_tm_tolerance: f64,
    /// Bases the primers may reach into the region
    pub max_inside: usize,
    /// Bases the primers may reach outside the region
    pub max_outside: usize,
}

impl Default for EbicSettings {
    fn default() -> Self {
        Self {
            target_tm: 55.0,
            target_tm_tolerance: 3.0,
            max_inside: 50,
            max_outside: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "design_type", content = "settings", rename_all = "snake_case")]
pub enum DesignType {
    SimplePair(HybridizationSettings),
    RestrictionLigation(RestrictionLigationSettings),
    GibsonAssembly(GibsonSettings),
    HomologousRecombination(HomologousRecombinationSettings),
    GatewayBp(GatewayBpSettings),
    Ebic(EbicSettings),
}

fn push(query: &mut Vec<(String, String)>, key: &str, value: impl ToString) {
    query.push((key.to_string(), value.to_string()));
}

impl DesignType {
    pub fn name(&self) -> &'static str {
        match self {
            DesignType::SimplePair(_) => "simple_pair",
            DesignType::RestrictionLigation(_) => "restriction_ligation",
            DesignType::GibsonAssembly(_) => "gibson_assembly",
            DesignType::HomologousRecombination(_) => "homologous_recombination",
            DesignType::GatewayBp(_) => "gateway_bp",
            DesignType::Ebic(_) => "ebic",
        }
    }

    pub fn endpoint(&self) -> DesignEndpoint {
        match self {
            DesignType::SimplePair(_)
            | DesignType::RestrictionLigation(_)
            | DesignType::GatewayBp(_) => DesignEndpoint::SimplePair,
            DesignType::GibsonAssembly(_) => DesignEndpoint::GibsonAssembly,
            DesignType::HomologousRecombination(_) => DesignEndpoint::HomologousRecombination,
            DesignType::Ebic(_) => DesignEndpoint::Ebic,
        }
    }

    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut query = vec![];
        match self {
            DesignType::SimplePair(hybridization) => hybridization.push_query(&mut query),
            DesignType::RestrictionLigation(settings) => {
                settings.hybridization.push_query(&mut query);
                if let Some(enzyme) = &settings.left_enzyme {
                    push(&mut query, "left_enzyme", enzyme);
                }
                if let Some(enzyme) = &settings.right_enzyme {
                    push(&mut query, "right_enzyme", enzyme);
                }
                push(&mut query, "filler_bases", &settings.filler_bases);
                push(
                    &mut query,
                    "left_enzyme_inverted",
                    settings.left_enzyme_inverted,
                );
                push(
                    &mut query,
                    "right_enzyme_inverted",
                    settings.right_enzyme_inverted,
                );
            }
            DesignType::GibsonAssembly(settings) => {
                push(&mut query, "homology_length", settings.homology_length);
                settings.hybridization.push_query(&mut query);
                push(&mut query, "circular", settings.circular);
            }
            DesignType::HomologousRecombination(settings) => {
                push(&mut query, "homology_length", settings.homology_length);
                settings.hybridization.push_query(&mut query);
            }
            DesignType::GatewayBp(settings) => settings.hybridization.push_query(&mut query),
            DesignType::Ebic(settings) => {
                push(&mut query, "target_tm", settings.target_tm);
                push(&mut query, "target_tm_tolerance", settings.target_tm_tolerance);
                push(&mut query, "max_inside", settings.max_inside);
                push(&mut query, "max_outside", settings.max_outside);
            }
        }
        query
    }

    /// Problems with the settings themselves; empty when they are usable.
    pub fn settings_errors(&self) -> Vec<String> {
        let mut errors = vec![];
        match self {
            DesignType::SimplePair(hybridization) => hybridization.check(&mut errors),
            DesignType::RestrictionLigation(settings) => {
                settings.hybridization.check(&mut errors);
                if settings.left_enzyme.is_none() && settings.right_enzyme.is_none() {
                    errors.push("Select at least one restriction enzyme".to_string());
                }
                if !crate::iupac_code::is_dna(&settings.filler_bases) {
                    errors.push("Filler bases must be DNA".to_string());
                }
            }
            DesignType::GibsonAssembly(settings) => {
                settings.hybridization.check(&mut errors);
                check_homology_length(settings.homology_length, &mut errors);
            }
            DesignType::HomologousRecombination(settings) => {
                settings.hybridization.check(&mut errors);
                check_homology_length(settings.homology_length, &mut errors);
            }
            DesignType::GatewayBp(settings) => {
                settings.hybridization.check(&mut errors);
                if settings.donor_vector.is_none() {
                    errors.push("Select a donor vector".to_string());
                }
            }
            DesignType::Ebic(settings) => {
                check_target_tm(settings.target_tm, &mut errors);
                if settings.target_tm_tolerance < 0.0 {
                    errors.push("Melting temperature tolerance cannot be negative".to_string());
                }
                if settings.max_inside == 0 || settings.max_outside == 0 {
                    errors.push(
                        "Maximum inside and outside distances must be positive".to_string(),
                    );
                }
            }
        }
        errors
    }

    /// How many spacers a design over `n_fragments` fragments takes.
    pub fn spacer_count(&self, n_fragments: usize) -> usize {
        match self {
            DesignType::GibsonAssembly(settings) if settings.circular => n_fragments,
            DesignType::GibsonAssembly(_) => n_fragments + 1,
            DesignType::Ebic(_) => 0,
            _ => 2,
        }
    }

    pub fn circular_assembly(&self) -> bool {
        matches!(self, DesignType::GibsonAssembly(settings) if settings.circular)
    }

    pub fn allows_whole_sequences(&self) -> bool {
        matches!(self, DesignType::GibsonAssembly(_))
    }

    /// Roles of the templates a session over `n_templates` sequences uses.
    pub fn fragment_roles(&self, n_templates: usize) -> Result<Vec<FragmentRole>, CloneError> {
        let expected = match self {
            DesignType::GibsonAssembly(_) if n_templates > 0 => {
                return Ok(vec![FragmentRole::Amplified; n_templates]);
            }
            DesignType::GibsonAssembly(_) => "at least one template",
            DesignType::HomologousRecombination(_) if n_templates == 2 => {
                return Ok(vec![FragmentRole::Amplified, FragmentRole::InsertionTarget]);
            }
            DesignType::HomologousRecombination(_) => "a template and a target",
            _ if n_templates == 1 => return Ok(vec![FragmentRole::Amplified]),
            _ => "exactly one template",
        };
        Err(CloneError::invalid_input(format!(
            "A {} design needs {expected}, got {n_templates}",
            self.name()
        )))
    }

    /// The backend request. `target` is only used by homologous
    /// recombination; EBIC templates need a location.
    pub fn build_request(
        &self,
        mut templates: Vec<PcrTemplate>,
        target: Option<LocatedSequence>,
        spacers: Vec<String>,
        settings: PrimerDesignSettings,
    ) -> Result<DesignRequest, CloneError> {
        let single = |templates: &mut Vec<PcrTemplate>| match templates.len() {
            1 => Ok(templates.remove(0)),
            n => Err(CloneError::invalid_input(format!(
                "A {} design needs exactly one template, got {n}",
                self.name()
            ))),
        };
        let body = match self {
            DesignType::SimplePair(_)
            | DesignType::RestrictionLigation(_)
            | DesignType::GatewayBp(_) => DesignRequestBody::SimplePair {
                pcr_template: single(&mut templates)?,
                spacers,
                settings,
            },
            DesignType::GibsonAssembly(_) => DesignRequestBody::GibsonAssembly {
                pcr_templates: templates,
                spacers,
                settings,
            },
            DesignType::HomologousRecombination(_) => DesignRequestBody::HomologousRecombination {
                pcr_template: single(&mut templates)?,
                homologous_recombination_target: target.ok_or_else(|| {
                    CloneError::invalid_input("Homologous recombination needs a target")
                })?,
                spacers,
                settings,
            },
            DesignType::Ebic(_) => {
                let template = single(&mut templates)?;
                let location = template.location.ok_or_else(|| {
                    CloneError::invalid_input("EBIC needs a region on the template")
                })?;
                DesignRequestBody::Ebic {
                    template: LocatedSequence {
                        sequence: template.sequence,
                        location,
                    },
                    settings,
                }
            }
        };
        Ok(DesignRequest {
            endpoint: self.endpoint(),
            query: self.query_params(),
            body,
        })
    }
}
