use std::path::Path;

use apt_link::{Address, CommandFrame};

use crate::serializer::parse_u16;
use crate::{open_xml, Compile, ConfigError, ConfigNode, Persistable, Result, ShutterChannelConfig};

/// Only shutter description version understood so far.
const SHUTTER_VERSION: &str = "0";

/// `FlipperShutterParameters` of one slot: its shutter channels.
#[derive(Clone, Debug, PartialEq)]
pub struct FlipperShutterGroup {
    slot: u16,
    shutters: Vec<ShutterChannelConfig>,
}

impl FlipperShutterGroup {
    pub fn from_node(node: &ConfigNode, slot: u16) -> Result<Self> {
        let mut shutters = Vec::new();
        let mut next_channel: u16 = 0;
        for shutter in node.children_named("Shutter") {
            let channel = match shutter.attr("channel") {
                Some(raw) => parse_u16(raw)
                    .ok_or_else(|| ConfigError::malformed(shutter, "channel", raw))?,
                None => next_channel,
            };
            // the counter follows declaration order, not explicit channels
            next_channel = next_channel.wrapping_add(1);
            match shutter.attr("version") {
                Some(SHUTTER_VERSION) => {}
                Some(other) => return Err(ConfigError::unsupported(shutter, "version", other)),
                None => return Err(ConfigError::missing(shutter, "version")),
            }
            shutters.push(ShutterChannelConfig::from_node(shutter, slot, channel)?);
        }
        let mirrors = node.children_named("Mirror").count();
        if mirrors > 0 {
            tracing::debug!(slot, mirrors, "mirror channels carry no parameters, skipped");
        }
        Ok(Self { slot, shutters })
    }

    /// Read a stand-alone file whose root is `FlipperShutterParameters`.
    pub fn load(path: impl AsRef<Path>, slot: u16) -> Result<Self> {
        let root = open_xml(path)?;
        let group = root
            .select("/FlipperShutterParameters")
            .ok_or_else(|| ConfigError::missing(&root, "FlipperShutterParameters"))?;
        Self::from_node(group, slot)
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub fn shutters(&self) -> &[ShutterChannelConfig] {
        &self.shutters
    }
}

impl Compile for FlipperShutterGroup {
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        self.compile_persistent(false)
    }
}

impl Persistable for FlipperShutterGroup {
    fn persist_target(&self) -> (Address, u16) {
        (Address::slot(self.slot).unwrap_or(Address::Slot(0)), 0)
    }

    /// Each shutter is followed by its own commit frames.
    fn compile_persistent(&self, persist: bool) -> Result<Vec<CommandFrame>> {
        let mut frames = Vec::new();
        for shutter in &self.shutters {
            frames.extend(shutter.compile_persistent(persist)?);
        }
        Ok(frames)
    }
}
