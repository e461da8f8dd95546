//! YAML manifests of desired resources
//!
//! ```yaml
//! resources:
//!   - kind: compute.Network
//!     name: my-network
//!     autoCreateSubnetworks: false
//! ```

use crate::resource::Resource;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Manifest {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content).context("parsing manifest")?;
        for (i, resource) in manifest.resources.iter().enumerate() {
            if crate::resource::get_resource(&resource.kind).is_none() {
                bail!("resource #{} has unknown kind {:?}", i + 1, resource.kind);
            }
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("in manifest {:?}", path))
    }

    /// Fill unset `project`, `region` and `zone` scope parameters
    pub fn fill_scope(&mut self, project: Option<&str>, region: Option<&str>, zone: Option<&str>) {
        for resource in &mut self.resources {
            fill_scope(resource, project, region, zone);
        }
    }
}

/// Fill unset scope parameters the resource's kind takes
pub fn fill_scope(resource: &mut Resource, project: Option<&str>, region: Option<&str>, zone: Option<&str>) {
    let Some(def) = crate::resource::get_resource(&resource.kind) else {
        return;
    };
    for (name, value) in [("project", project), ("region", region), ("zone", zone)] {
        let Some(value) = value else { continue };
        let takes_param = def.field(name).is_some_and(|f| f.parameter);
        if takes_param && resource.is_unset(name) {
            resource.set(name, value);
        }
    }
}
