use std::path::Path;

use crate::{open_xml, AllowedDevices, ConfigNode, Joysticks, Result, Settings};

/// A whole system file. Each section is optional; unknown top-level elements are skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemConfig {
    pub settings: Option<Settings>,
    pub allowed_devices: Option<AllowedDevices>,
    pub joysticks: Option<Joysticks>,
}

impl SystemConfig {
    /// Read, preprocess and parse a system file.
    ///
    /// Nothing is returned unless every section parsed, so a bad file never leads to a
    /// half-provisioned controller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = open_xml(path)?;
        let system = Self::from_node(&root)?;
        tracing::info!(
            file = %path.display(),
            cards = system.settings.as_ref().map_or(0, |s| s.cards().len()),
            devices = system.allowed_devices.as_ref().map_or(0, |a| a.devices().len()),
            ports = system.joysticks.as_ref().map_or(0, |j| j.ports().len()),
            "system file loaded"
        );
        Ok(system)
    }

    pub fn from_node(root: &ConfigNode) -> Result<Self> {
        let mut system = Self::default();
        for section in root.children() {
            match section.name() {
                "Settings" => system.settings = Some(Settings::from_node(section)?),
                "AllowedDevices" => {
                    system.allowed_devices = Some(AllowedDevices::from_node(section)?)
                }
                "Joysticks" => system.joysticks = Some(Joysticks::from_node(section)?),
                other => tracing::debug!(element = other, "unknown system section skipped"),
            }
        }
        Ok(system)
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_none() && self.allowed_devices.is_none() && self.joysticks.is_none()
    }
}
