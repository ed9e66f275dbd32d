pub mod about;
pub mod assembly;
pub mod backend;
pub mod cloning_graph;
pub mod config;
pub mod design;
pub mod dna_sequence;
pub mod edit_buffer;
pub mod error;
pub mod feature_location;
pub mod iupac_code;
pub mod plan;
pub mod primer_details;
pub mod primer_export;
pub mod region;
pub mod session;
