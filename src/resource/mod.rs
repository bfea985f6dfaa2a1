//! Resource name registry
//!
//! This module turns user-supplied resource strings into typed references.
//! Collection definitions are loaded from JSON files at compile time, and
//! more can be added from a YAML file at runtime without code changes.
//!
//! # Architecture
//!
//! - [`template`] - Path templates such as `projects/{project}/zones/{zone}`
//! - [`registry`] - Collections, API versions and per-parameter fallthroughs
//! - [`parser`] - URLs, relative names, bare IDs and `gs://` paths
//! - [`resolver`] - Fills parameters from flags, properties and defaults
//! - [`reference`] - The parsed [`Resource`]
//!
//! # Resource Definitions
//!
//! Collections are defined in JSON files under `src/resources/`:
//! - `common.json` - Parameter fallthroughs shared by every API
//! - `compute.json` - Compute Engine collections (VMs, disks, networks)
//! - `storage.json` - Cloud Storage collections (buckets, objects)
//! - `gke.json` - GKE collections (clusters, node pools)
//! - `platform.json` - Pub/Sub, IAM, Functions, Dataproc, DNS and friends
//!
//! # Example
//!
//! ```ignore
//! use gcref::config::Properties;
//! use gcref::resource::{Params, Registry};
//!
//! let registry = Registry::builtin(Properties::empty().with("core/project", "my-project"))?;
//! let vm = registry.parse("my-vm", "compute.instances", &Params::from([
//!     ("zone".to_string(), "us-central1-a".to_string()),
//! ]))?;
//! assert_eq!(vm.relative_name(), "projects/my-project/zones/us-central1-a/instances/my-vm");
//! ```

pub mod collection;
mod error;
mod parser;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod template;

pub use collection::{CollectionInfo, CollectionKey};
pub use error::{ResourceError, Result};
pub use parser::Params;
pub use reference::Resource;
pub use registry::{ApiDef, CollectionDef, DefinitionFile, ParamDefaultDef, Registry};
pub use resolver::{resolve, Fallthrough};
pub use template::PathTemplate;
