//! gcref - resource names for Google Cloud
//!
//! Parses full URLs, relative names and short IDs into typed resource
//! references, filling in missing parameters from command-line flags and
//! gcloud configuration properties.

pub mod config;
pub mod resource;
