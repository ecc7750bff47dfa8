pub mod audit_verify;
pub mod canonical_json;
pub mod catalog;
pub mod collectors;
pub mod error;
pub mod evidence_store;
pub mod exporter;
pub mod hasher;
pub mod ids;
pub mod matcher;
pub mod model;
pub mod orchestrator;
pub mod rules;
