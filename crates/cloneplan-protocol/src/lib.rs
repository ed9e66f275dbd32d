//! Machine-readable contracts exchanged with the cloning computation backend.
//!
//! Everything in here is plain serde data. Behaviour lives in the `cloneplan`
//! crate; this crate only pins down field names and shapes on the wire.

use serde::{Deserialize, Serialize};

pub const PRIMER_DETAILS_PATH: &str = "primer_details";
pub const PRIMER_HETERODIMER_PATH: &str = "primer_heterodimer";
pub const TEXT_FILE_SEQUENCE_TYPE: &str = "TextFileSequence";
pub const GENBANK_FORMAT: &str = "genbank";

pub type PrimerId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Primer {
    #[serde(default)]
    pub id: PrimerId,
    pub name: String,
    pub sequence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<u64>,
}

/// A sequence as the backend sees it: a serialised record plus its sticky ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntity {
    pub id: u64,
    #[serde(rename = "type", default = "default_entity_type")]
    pub entity_type: String,
    pub file_content: String,
    #[serde(default = "default_file_format")]
    pub sequence_file_format: String,
    #[serde(default)]
    pub overhang_crick_3prime: i64,
    #[serde(default)]
    pub overhang_watson_3prime: i64,
}

fn default_entity_type() -> String {
    TEXT_FILE_SEQUENCE_TYPE.to_string()
}

fn default_file_format() -> String {
    GENBANK_FORMAT.to_string()
}

impl SequenceEntity {
    pub fn genbank(id: u64, file_content: String) -> Self {
        Self {
            id,
            entity_type: default_entity_type(),
            file_content,
            sequence_file_format: default_file_format(),
            overhang_crick_3prime: 0,
            overhang_watson_3prime: 0,
        }
    }
}

/// Assembly-wide primer settings, sent as `settings` in every design body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerDesignSettings {
    /// nM
    pub primer_dna_conc: f64,
    /// mM
    pub primer_salt_monovalent: f64,
    /// mM
    pub primer_salt_divalent: f64,
}

impl Default for PrimerDesignSettings {
    fn default() -> Self {
        Self {
            primer_dna_conc: 50.0,
            primer_salt_monovalent: 50.0,
            primer_salt_divalent: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcrTemplate {
    pub sequence: SequenceEntity,
    /// `None` is sent as `null`: the backend then uses the whole sequence.
    pub location: Option<String>,
    pub forward_orientation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedSequence {
    pub sequence: SequenceEntity,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DesignRequestBody {
    // Listed before `SimplePair`, whose fields are a subset of these.
    HomologousRecombination {
        pcr_template: PcrTemplate,
        homologous_recombination_target: LocatedSequence,
        spacers: Vec<String>,
        settings: PrimerDesignSettings,
    },
    SimplePair {
        pcr_template: PcrTemplate,
        spacers: Vec<String>,
        settings: PrimerDesignSettings,
    },
    GibsonAssembly {
        pcr_templates: Vec<PcrTemplate>,
        spacers: Vec<String>,
        settings: PrimerDesignSettings,
    },
    Ebic {
        template: LocatedSequence,
        settings: PrimerDesignSettings,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignEndpoint {
    SimplePair,
    GibsonAssembly,
    HomologousRecombination,
    Ebic,
}

impl DesignEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::SimplePair => "primer_design/simple_pair",
            Self::GibsonAssembly => "primer_design/gibson_assembly",
            Self::HomologousRecombination => "primer_design/homologous_recombination",
            Self::Ebic => "primer_design/ebic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRequest {
    pub endpoint: DesignEndpoint,
    pub query: Vec<(String, String)>,
    pub body: DesignRequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignResponse {
    pub primers: Vec<Primer>,
}

/// Melting temperature, free energy and the backend's ASCII alignment figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermoResult {
    pub melting_temperature: f64,
    #[serde(rename = "deltaG")]
    pub delta_g: f64,
    #[serde(default)]
    pub figure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerDetailsResponse {
    pub melting_temperature: f64,
    pub gc_content: f64,
    #[serde(default)]
    pub homodimer: Option<ThermoResult>,
    #[serde(default)]
    pub hairpin: Option<ThermoResult>,
}

/// Error payload of a failed backend request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        if let Some(description) = self.description.as_ref().filter(|d| !d.trim().is_empty()) {
            return Some(description.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => {
                Some(detail.clone())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity() -> SequenceEntity {
        SequenceEntity::genbank(3, "LOCUS x".to_string())
    }

    #[test]
    fn non_amplified_template_sends_null_location() {
        let body = DesignRequestBody::GibsonAssembly {
            pcr_templates: vec![PcrTemplate {
                sequence: entity(),
                location: None,
                forward_orientation: true,
            }],
            spacers: vec![],
            settings: PrimerDesignSettings::default(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["pcr_templates"][0]["location"], serde_json::Value::Null);
        assert_eq!(value["pcr_templates"][0]["sequence"]["type"], "TextFileSequence");
    }

    #[test]
    fn homologous_recombination_body_round_trips_as_itself() {
        let body = DesignRequestBody::HomologousRecombination {
            pcr_template: PcrTemplate {
                sequence: entity(),
                location: Some("1..10".to_string()),
                forward_orientation: false,
            },
            homologous_recombination_target: LocatedSequence {
                sequence: entity(),
                location: "5^6".to_string(),
            },
            spacers: vec![String::new(), String::new()],
            settings: PrimerDesignSettings::default(),
        };
        let text = serde_json::to_string(&body).unwrap();
        let back: DesignRequestBody = serde_json::from_str(&text).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn thermo_result_uses_camel_case_delta_g() {
        let parsed: ThermoResult = serde_json::from_value(json!({
            "melting_temperature": 12.5,
            "deltaG": -3000.0,
            "figure": "ACGT\n||||\nTGCA"
        }))
        .unwrap();
        assert_eq!(parsed.delta_g, -3000.0);
    }

    #[test]
    fn error_body_prefers_description_over_detail() {
        let body: ErrorBody =
            serde_json::from_value(json!({"description": "bad", "detail": "worse"})).unwrap();
        assert_eq!(body.message().as_deref(), Some("bad"));
        let body: ErrorBody = serde_json::from_value(json!({"detail": [{"msg": "x"}]})).unwrap();
        assert_eq!(body.message(), None);
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(DesignEndpoint::SimplePair.path(), "primer_design/simple_pair");
        assert_eq!(DesignEndpoint::Ebic.path(), "primer_design/ebic");
    }
}
