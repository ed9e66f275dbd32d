use cloneplan::{
    about,
    backend::HttpBackend,
    cloning_graph::{CloningState, SourceKind},
    config::BackendConfig,
    dna_sequence::SequenceRecord,
    iupac_code::is_dna,
    plan::DesignPlan,
    primer_details::PropertyCache,
    primer_export::{PrimerWithDetails, primers_to_tabular_file},
    region::{Region, location_string_to_region, region_to_location_string},
};
use log::info;
use serde::Serialize;
use std::{env, fs};

const DEFAULT_STATE_PATH: &str = ".cloneplan_state.json";

#[derive(Serialize)]
struct SequenceSummary {
    id: u64,
    name: Option<String>,
    length: usize,
    circular: bool,
    features: usize,
}

#[derive(Serialize)]
struct SourceSummary {
    id: u64,
    kind: String,
    template: Option<u64>,
    has_primers: bool,
}

#[derive(Serialize)]
struct StateSummary {
    sequence_count: usize,
    sequences: Vec<SequenceSummary>,
    sources: Vec<SourceSummary>,
    primer_count: usize,
    main_sequence_id: Option<u64>,
}

#[derive(Serialize)]
struct PrimerDetailsOutput {
    sequence: String,
    length: usize,
    melting_temperature: String,
    gc_content: String,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  cloneplan_cli --version\n  \
  cloneplan_cli location START END SIZE\n  \
  cloneplan_cli insertion CARET\n  \
  cloneplan_cli parse-location LOCATION SIZE\n  \
  cloneplan_cli [--state PATH] load-genbank PATH\n  \
  cloneplan_cli [--state PATH] load-fasta PATH\n  \
  cloneplan_cli [--state PATH] add-pcr TEMPLATE_ID\n  \
  cloneplan_cli [--state PATH] state-summary\n  \
  cloneplan_cli [--state PATH] preview '<plan-json>' [--out PATH]\n  \
  cloneplan_cli [--state PATH] [--config PATH] design '<plan-json>'\n  \
  cloneplan_cli [--config PATH] primer-details SEQUENCE [BINDING_LENGTH]\n  \
  cloneplan_cli [--state PATH] [--config PATH] export-primers [--separator C]\n\n  \
  Tip: pass @file.json instead of inline JSON\n  \
  Backend: CLONEPLAN_BACKEND_URL, CLONEPLAN_BACKEND_TIMEOUT_SECS"
    );
}

fn load_json_arg(value: &str) -> Result<String, String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).map_err(|e| format!("Could not read JSON file '{path}': {e}"))
    } else {
        Ok(value.to_string())
    }
}

fn load_state(path: &str) -> Result<CloningState, String> {
    if std::path::Path::new(path).exists() {
        CloningState::load_from_path(path).map_err(|e| e.to_string())
    } else {
        Ok(CloningState::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

struct GlobalArgs {
    state_path: String,
    config_path: Option<String>,
    cmd_idx: usize,
}

fn parse_global_args(args: &[String]) -> Result<GlobalArgs, String> {
    let mut ret = GlobalArgs {
        state_path: DEFAULT_STATE_PATH.to_string(),
        config_path: None,
        cmd_idx: 1,
    };
    while ret.cmd_idx < args.len() {
        let flag = args[ret.cmd_idx].as_str();
        if flag != "--state" && flag != "--config" {
            break;
        }
        let value = args
            .get(ret.cmd_idx + 1)
            .ok_or_else(|| format!("Missing value for {flag}"))?
            .clone();
        match flag {
            "--state" => ret.state_path = value,
            _ => ret.config_path = Some(value),
        }
        ret.cmd_idx += 2;
    }
    Ok(ret)
}

fn parse_number(value: &str, what: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|e| format!("Invalid {what} '{value}': {e}"))
}

fn parse_separator(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if value.len() == 1 => Ok(value.as_bytes()[0]),
        _ => Err(format!("Separator must be a single character, got '{value}'")),
    }
}

fn backend(global: &GlobalArgs) -> Result<HttpBackend, String> {
    let config = BackendConfig::load(global.config_path.as_deref()).map_err(|e| e.to_string())?;
    let backend = HttpBackend::new(config).map_err(|e| e.to_string())?;
    info!("Using backend at {}", backend.config().base_url());
    Ok(backend)
}

fn summarize_state(state: &CloningState) -> StateSummary {
    let sequences: Vec<SequenceSummary> = state
        .sequences
        .iter()
        .map(|(id, dna)| SequenceSummary {
            id: *id,
            name: dna.name().map(|name| name.to_string()),
            length: dna.len(),
            circular: dna.is_circular(),
            features: dna.features().len(),
        })
        .collect();
    let sources = state
        .sources
        .iter()
        .map(|source| {
            let (kind, has_primers) = match &source.kind {
                SourceKind::Pcr {
                    forward_primer,
                    reverse_primer,
                    ..
                } => ("pcr", forward_primer.is_some() && reverse_primer.is_some()),
                SourceKind::HomologousRecombination { .. } => ("homologous_recombination", false),
                SourceKind::Other { .. } => ("other", false),
            };
            SourceSummary {
                id: source.id,
                kind: kind.to_string(),
                template: source.pcr_template(),
                has_primers,
            }
        })
        .collect();
    StateSummary {
        sequence_count: sequences.len(),
        sequences,
        sources,
        primer_count: state.primers.len(),
        main_sequence_id: state.main_sequence_id,
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let global = parse_global_args(&args)?;
    let cmd_idx = global.cmd_idx;
    if args.len() <= cmd_idx {
        usage();
        return Err("Missing command".to_string());
    }
    let command = &args[cmd_idx];
    let state_path = global.state_path.as_str();

    match command.as_str() {
        "location" => {
            if args.len() <= cmd_idx + 3 {
                usage();
                return Err("location requires: START END SIZE".to_string());
            }
            let region = Region::Range {
                start: parse_number(&args[cmd_idx + 1], "start")?,
                end: parse_number(&args[cmd_idx + 2], "end")?,
            };
            let size = parse_number(&args[cmd_idx + 3], "size")?;
            println!("{}", region_to_location_string(&region, size));
            Ok(())
        }
        "insertion" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("insertion requires: CARET".to_string());
            }
            let region = Region::Insertion {
                caret: parse_number(&args[cmd_idx + 1], "caret")?,
            };
            println!("{}", region_to_location_string(&region, 0));
            Ok(())
        }
        "parse-location" => {
            if args.len() <= cmd_idx + 2 {
                usage();
                return Err("parse-location requires: LOCATION SIZE".to_string());
            }
            let size = parse_number(&args[cmd_idx + 2], "size")?;
            let region =
                location_string_to_region(&args[cmd_idx + 1], size).map_err(|e| e.to_string())?;
            print_json(&region)
        }
        "load-genbank" | "load-fasta" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err(format!("Missing path for {command}"));
            }
            let path = &args[cmd_idx + 1];
            let records = if command == "load-fasta" {
                SequenceRecord::from_fasta_file(path)
            } else {
                SequenceRecord::from_genbank_file(path)
            }
            .map_err(|e| format!("Could not load '{path}': {e}"))?;
            let mut state = load_state(state_path)?;
            let ids: Vec<u64> = records
                .into_iter()
                .map(|record| state.add_sequence(record))
                .collect();
            state.save_to_path(state_path).map_err(|e| e.to_string())?;
            print_json(&ids)
        }
        "add-pcr" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("add-pcr requires: TEMPLATE_ID".to_string());
            }
            let template = parse_number(&args[cmd_idx + 1], "template id")? as u64;
            let mut state = load_state(state_path)?;
            state.sequence(template).map_err(|e| e.to_string())?;
            let source_id = state.add_source(
                SourceKind::Pcr {
                    template,
                    forward_primer: None,
                    reverse_primer: None,
                },
                None,
            );
            state.save_to_path(state_path).map_err(|e| e.to_string())?;
            println!("{source_id}");
            Ok(())
        }
        "state-summary" => {
            let state = load_state(state_path)?;
            print_json(&summarize_state(&state))
        }
        "preview" | "design" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("Missing design plan JSON".to_string());
            }
            let json = load_json_arg(&args[cmd_idx + 1])?;
            let plan = DesignPlan::from_json(&json).map_err(|e| e.to_string())?;
            let mut state = load_state(state_path)?;
            let mut session = plan.into_session(&state).map_err(|e| e.to_string())?;

            if command == "preview" {
                let product = session
                    .compute_preview(&state)
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| "The plan does not select every region".to_string())?;
                match (args.get(cmd_idx + 2).map(|s| s.as_str()), args.get(cmd_idx + 3)) {
                    (Some("--out"), Some(out)) => product
                        .write_genbank_file(out)
                        .map_err(|e| format!("Could not write GenBank file '{out}': {e}"))?,
                    (Some("--out"), None) => return Err("Missing path for --out".to_string()),
                    (Some(other), _) => return Err(format!("Unknown option '{other}'")),
                    (None, _) => {
                        let text = product
                            .to_genbank_string()
                            .map_err(|e| format!("Could not write GenBank: {e}"))?;
                        print!("{text}");
                    }
                }
                return Ok(());
            }

            let backend = backend(&global)?;
            session
                .submit(&backend, &state)
                .map_err(|e| e.to_string())?;
            if let Some(error) = session.error() {
                return Err(error.to_string());
            }
            let primers = session.primers().to_vec();
            let ids = session.commit(&mut state).map_err(|e| e.to_string())?;
            state.save_to_path(state_path).map_err(|e| e.to_string())?;
            let committed: Vec<_> = ids
                .iter()
                .filter_map(|id| state.primer(*id).ok())
                .collect();
            info!("Designed {} primers", primers.len());
            print_json(&committed)
        }
        "primer-details" => {
            if args.len() <= cmd_idx + 1 {
                usage();
                return Err("primer-details requires: SEQUENCE [BINDING_LENGTH]".to_string());
            }
            let sequence = args[cmd_idx + 1].to_ascii_uppercase();
            if sequence.is_empty() || !is_dna(&sequence) {
                return Err(format!("'{sequence}' is not a DNA sequence"));
            }
            let binding_length = match args.get(cmd_idx + 2) {
                Some(value) => Some(parse_number(value, "binding length")?),
                None => None,
            };
            let backend = backend(&global)?;
            let cache = PropertyCache::new();
            let details = cache
                .binding_details(&backend, &sequence, binding_length)
                .map_err(|e| e.to_display_string())?;
            print_json(&PrimerDetailsOutput {
                length: details.binding.length,
                melting_temperature: details.melting_temperature_label(),
                gc_content: details.gc_content_label(),
                sequence,
            })
        }
        "export-primers" => {
            let separator = match args.get(cmd_idx + 1).map(|s| s.as_str()) {
                Some("--separator") => parse_separator(
                    args.get(cmd_idx + 2)
                        .ok_or_else(|| "Missing value for --separator".to_string())?,
                )?,
                Some(other) => return Err(format!("Unknown option '{other}'")),
                None => b',',
            };
            let state = load_state(state_path)?;
            if state.primers.is_empty() {
                return Ok(());
            }
            let backend = backend(&global)?;
            let cache = PropertyCache::new();
            let sequences: Vec<String> =
                state.primers.iter().map(|p| p.sequence.clone()).collect();
            let details = cache
                .multiple_primer_details(&backend, &sequences)
                .map_err(|e| e.to_display_string())?;
            let primers: Vec<PrimerWithDetails> = state
                .primers
                .iter()
                .cloned()
                .zip(details)
                .map(|(primer, details)| PrimerWithDetails { primer, details })
                .collect();
            let pcr_sources: Vec<u64> = state
                .sources
                .iter()
                .filter(|source| source.pcr_template().is_some())
                .map(|source| source.id)
                .collect();
            let pcr_details = cache
                .pcr_details(&backend, &state, &pcr_sources)
                .map_err(|e| e.message)?;
            let table = primers_to_tabular_file(&primers, &pcr_details, separator)
                .map_err(|e| e.to_string())?;
            print!("{table}");
            Ok(())
        }
        _ => {
            usage();
            Err(format!("Unknown command '{command}'"))
        }
    }
}
