//! USB HID joystick mapping on the motherboard's host ports.
//!
//! Each `Port` carries one `Joystick` whose `InMap` entries route an input control
//! (button, axis) to a slot, and whose `OutMap` entries drive an output (LED) from a
//! slot's state.

use std::path::Path;

use apt_link::{commands, Address, CommandFrame};

use crate::resolver::{self, Collideable};
use crate::serializer::parse_uint;
use crate::{open_xml, Compile, ConfigError, ConfigNode, Persistable, Result};

const IN_MAP_PAYLOAD: usize = 21;
const OUT_MAP_PAYLOAD: usize = 15;
const MAX_COLORS: usize = 3;

fn value_of<T: TryFrom<u32>>(node: &ConfigNode, attr: &str) -> Result<T> {
    let raw = node
        .attr(attr)
        .ok_or_else(|| ConfigError::missing(node, attr))?;
    parse_uint(raw)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| ConfigError::malformed(node, attr, raw))
}

fn opt_value_of<T: TryFrom<u32>>(node: &ConfigNode, attr: &str) -> Result<Option<T>> {
    if node.has_attr(attr) {
        value_of(node, attr).map(Some)
    } else {
        Ok(None)
    }
}

/// Another control whose behaviour an input mapping modifies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TargetControl {
    pub port: u8,
    pub control: u16,
}

impl TargetControl {
    fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut target = TargetControl {
            port: u8::MAX,
            control: u16::MAX,
        };
        for child in node.children() {
            match child.name() {
                "Port" => target.port = value_of(child, "value")?,
                "ControlNum" => target.control = value_of(child, "value")?,
                _ => {}
            }
        }
        Ok(target)
    }
}

/// Where an input is delivered, or where an output takes its state from.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Dispatcher {
    /// Slot bitmask.
    pub slots: u8,
    pub bit: u8,
    pub port: u8,
    pub is_virtual: u8,
}

impl Dispatcher {
    fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut d = Dispatcher::default();
        for child in node.children() {
            match child.name() {
                "Slot" => d.slots = value_of(child, "value")?,
                "Bit" => d.bit = value_of(child, "value")?,
                "Port" => d.port = value_of(child, "value")?,
                "Virtual" => d.is_virtual = value_of(child, "value")?,
                _ => {}
            }
        }
        Ok(d)
    }

    fn bytes(&self) -> [u8; 4] {
        [self.slots, self.bit, self.port, self.is_virtual]
    }
}

/// Input mapping for one control.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InMap {
    pub control: u8,
    pub vid: u16,
    pub pid: u16,
    pub target: TargetControl,
    pub destination: Dispatcher,
    pub speed: u8,
    pub reverse: u8,
    pub deadband: u8,
    pub mode: u32,
}

impl InMap {
    fn from_node(node: &ConfigNode, next_control: &mut u8) -> Result<Self> {
        let mut map = InMap {
            control: control_number(node, next_control)?,
            ..InMap::default()
        };
        for child in node.children() {
            match child.name() {
                "VID" => map.vid = value_of(child, "value")?,
                "PID" => map.pid = value_of(child, "value")?,
                "ModifyControl" => map.target = TargetControl::from_node(child)?,
                "Destination" => map.destination = Dispatcher::from_node(child)?,
                "ModifySpeed" => map.speed = value_of(child, "value")?,
                "ReverseDir" => map.reverse = value_of(child, "value")?,
                "Deadband" => map.deadband = value_of(child, "value")?,
                "Mode" => map.mode = value_of(child, "value")?,
                _ => {}
            }
        }
        Ok(map)
    }

    fn payload(&self, port: u8) -> Vec<u8> {
        let mut p = Vec::with_capacity(IN_MAP_PAYLOAD);
        p.push(port);
        p.push(self.control);
        p.extend_from_slice(&self.vid.to_le_bytes());
        p.extend_from_slice(&self.pid.to_le_bytes());
        p.push(self.target.port);
        p.extend_from_slice(&self.target.control.to_le_bytes());
        p.extend_from_slice(&self.destination.bytes());
        p.push(self.speed);
        p.push(self.reverse);
        p.push(self.deadband);
        p.extend_from_slice(&self.mode.to_le_bytes());
        // control enabled
        p.push(0);
        p
    }
}

impl Collideable for InMap {
    fn collides_with(&self, other: &Self) -> bool {
        self.control == other.control
    }
}

/// Output mapping for one control.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OutMap {
    pub control: u8,
    pub usage: u8,
    pub vid: u16,
    pub pid: u16,
    pub led_mode: u32,
    pub colors: [u32; MAX_COLORS],
    pub source: Dispatcher,
}

impl OutMap {
    fn from_node(node: &ConfigNode, next_control: &mut u8) -> Result<Self> {
        let mut map = OutMap {
            control: control_number(node, next_control)?,
            ..OutMap::default()
        };
        let mut colors: [Option<u32>; MAX_COLORS] = [None; MAX_COLORS];
        let mut next_color = 0usize;
        for child in node.children() {
            match child.name() {
                "VID" => map.vid = value_of(child, "value")?,
                "PID" => map.pid = value_of(child, "value")?,
                "Mode" => map.led_mode = value_of(child, "value")?,
                "Usage" => map.usage = value_of(child, "value")?,
                "Source" => map.source = Dispatcher::from_node(child)?,
                "ColorID" => {
                    let index = match opt_value_of::<u8>(child, "index")? {
                        Some(one_based) => {
                            let index = usize::from(one_based)
                                .checked_sub(1)
                                .filter(|i| *i < MAX_COLORS)
                                .ok_or_else(|| {
                                    ConfigError::malformed(child, "index", one_based.to_string())
                                })?;
                            if colors[index].is_some() {
                                return Err(ConfigError::structure(
                                    child,
                                    format!("colour {one_based} declared twice"),
                                ));
                            }
                            index
                        }
                        None => next_color,
                    };
                    let slot = colors.get_mut(index).ok_or_else(|| {
                        ConfigError::structure(child, "more than three colours")
                    })?;
                    *slot = Some(value_of(child, "value")?);
                    next_color = index + 1;
                }
                _ => {}
            }
        }
        map.colors = colors.map(|c| c.unwrap_or(0));
        Ok(map)
    }

    fn payload(&self, port: u8) -> Vec<u8> {
        let mut p = Vec::with_capacity(OUT_MAP_PAYLOAD);
        p.push(port);
        p.push(self.control);
        p.push(self.usage);
        p.extend_from_slice(&self.vid.to_le_bytes());
        p.extend_from_slice(&self.pid.to_le_bytes());
        // the device keeps one byte of each of these
        p.push(self.led_mode.to_le_bytes()[0]);
        for color in self.colors {
            p.push(color.to_le_bytes()[0]);
        }
        p.extend_from_slice(&self.source.bytes());
        p
    }
}

impl Collideable for OutMap {
    fn collides_with(&self, other: &Self) -> bool {
        self.control == other.control
    }
}

fn control_number(node: &ConfigNode, next: &mut u8) -> Result<u8> {
    let control = match opt_value_of::<u8>(node, "control")? {
        Some(c) => c,
        None => *next,
    };
    *next = control.wrapping_add(1);
    Ok(control)
}

/// One host port and the joystick mapped on it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoystickPort {
    pub index: u8,
    pub name: String,
    in_maps: Vec<InMap>,
    out_maps: Vec<OutMap>,
}

impl JoystickPort {
    pub fn new(index: u8, in_maps: Vec<InMap>, out_maps: Vec<OutMap>) -> Self {
        Self {
            index,
            name: String::new(),
            in_maps,
            out_maps,
        }
    }

    fn from_node(node: &ConfigNode, next_index: &mut u8) -> Result<Self> {
        let index = match opt_value_of::<u8>(node, "index")? {
            Some(i) => i,
            None => *next_index,
        };
        *next_index = index.wrapping_add(1);
        let mut port = JoystickPort::new(index, Vec::new(), Vec::new());
        for child in node.children() {
            match child.name() {
                "Name" => port.name = child.attr("value").unwrap_or_default().to_string(),
                "Joystick" => port.read_joystick(child)?,
                _ => {}
            }
        }
        Ok(port)
    }

    /// Build a port from a `Joystick` element on its own.
    pub fn from_joystick_node(node: &ConfigNode, index: u8) -> Result<Self> {
        let mut port = JoystickPort::new(index, Vec::new(), Vec::new());
        port.read_joystick(node)?;
        Ok(port)
    }

    /// Read a stand-alone joystick file for host port `index`.
    pub fn load_joystick(path: impl AsRef<Path>, index: u8) -> Result<Self> {
        Self::from_joystick_node(&open_xml(path)?, index)
    }

    fn read_joystick(&mut self, node: &ConfigNode) -> Result<()> {
        let mut next_in = 0;
        let mut next_out = 0;
        let mut in_maps = Vec::new();
        let mut out_maps = Vec::new();
        for child in node.children() {
            match child.name() {
                "InMap" => in_maps.push(InMap::from_node(child, &mut next_in)?),
                "OutMap" => out_maps.push(OutMap::from_node(child, &mut next_out)?),
                _ => {}
            }
        }
        self.in_maps = resolver::unique(in_maps)
            .map_err(|c| ConfigError::collision(node, "input control", c))?;
        self.out_maps = resolver::unique(out_maps)
            .map_err(|c| ConfigError::collision(node, "output control", c))?;
        Ok(())
    }

    pub fn in_maps(&self) -> &[InMap] {
        &self.in_maps
    }

    pub fn out_maps(&self) -> &[OutMap] {
        &self.out_maps
    }
}

impl Compile for JoystickPort {
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        let mut frames = Vec::with_capacity(self.in_maps.len() + self.out_maps.len());
        for map in &self.in_maps {
            frames.push(CommandFrame::long(
                commands::MOD_SET_JOYSTICK_MAP_IN,
                Address::Motherboard,
                map.payload(self.index),
            )?);
        }
        for map in &self.out_maps {
            frames.push(CommandFrame::long(
                commands::MOD_SET_JOYSTICK_MAP_OUT,
                Address::Motherboard,
                map.payload(self.index),
            )?);
        }
        Ok(frames)
    }
}

impl Persistable for JoystickPort {
    fn persist_target(&self) -> (Address, u16) {
        (Address::Motherboard, u16::from(self.index))
    }

    /// Both map tables are committed, whether or not this port declared entries in them.
    fn compile_persistent(&self, persist: bool) -> Result<Vec<CommandFrame>> {
        let mut frames = self.compile()?;
        if persist {
            let (destination, channel) = self.persist_target();
            frames.push(CommandFrame::persist(
                destination,
                channel,
                commands::MOD_SET_JOYSTICK_MAP_IN,
            ));
            frames.push(CommandFrame::persist(
                destination,
                channel,
                commands::MOD_SET_JOYSTICK_MAP_OUT,
            ));
        }
        Ok(frames)
    }
}

impl Collideable for JoystickPort {
    fn collides_with(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

/// The `Joysticks` element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Joysticks {
    ports: Vec<JoystickPort>,
}

impl Joysticks {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_node(&open_xml(path)?)
    }

    pub fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut next_index = 0;
        let ports = node
            .children_named("Port")
            .map(|p| JoystickPort::from_node(p, &mut next_index))
            .collect::<Result<Vec<_>>>()?;
        let ports = resolver::unique(ports)
            .map_err(|c| ConfigError::collision(node, "joystick port", c))?;
        Ok(Self { ports })
    }

    pub fn ports(&self) -> &[JoystickPort] {
        &self.ports
    }

    /// Frames for every port, each port followed by its commit frames when `persist`.
    pub fn compile_persistent(&self, persist: bool) -> Result<Vec<CommandFrame>> {
        let mut frames = Vec::new();
        for port in &self.ports {
            frames.extend(port.compile_persistent(persist)?);
        }
        Ok(frames)
    }
}

impl Compile for Joysticks {
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        self.compile_persistent(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valued(name: &str, value: &str) -> ConfigNode {
        ConfigNode::new(name).with_attr("value", value)
    }

    fn in_map() -> ConfigNode {
        ConfigNode::new("InMap")
            .with_child(valued("VID", "0x1313"))
            .with_child(valued("PID", "0x9000"))
            .with_child(
                ConfigNode::new("Destination")
                    .with_child(valued("Slot", "4"))
                    .with_child(valued("Bit", "2"))
                    .with_child(valued("Port", "1"))
                    .with_child(valued("Virtual", "0")),
            )
            .with_child(valued("ModifySpeed", "50"))
            .with_child(valued("ReverseDir", "1"))
            .with_child(valued("Deadband", "3"))
            .with_child(valued("Mode", "2"))
    }

    #[test]
    fn in_map_frame_layout() {
        let js = ConfigNode::new("Joystick").with_child(in_map());
        let port = JoystickPort::from_joystick_node(&js, 2).unwrap();
        let frames = port.compile().unwrap();
        let bytes = frames[0].to_bytes();
        assert_eq!(bytes.len(), 27);
        assert_eq!(
            bytes,
            vec![
                0x14, 0x40, 21, 0, 0x91, 0x01, // header
                2, 0, 0x13, 0x13, 0x00, 0x90, // port, control, vid, pid
                0, 0, 0, // no ModifyControl
                4, 2, 1, 0, // destination
                50, 1, 3, // speed, reverse, deadband
                2, 0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn modify_control_defaults_to_wildcard() {
        let js = ConfigNode::new("Joystick").with_child(
            ConfigNode::new("InMap")
                .with_attr("control", "7")
                .with_child(ConfigNode::new("ModifyControl").with_child(valued("Port", "1"))),
        );
        let port = JoystickPort::from_joystick_node(&js, 0).unwrap();
        assert_eq!(
            port.in_maps()[0].target,
            TargetControl {
                port: 1,
                control: 0xFFFF
            }
        );
        assert_eq!(port.in_maps()[0].control, 7);
    }

    #[test]
    fn out_map_colors_and_layout() {
        let out = ConfigNode::new("OutMap")
            .with_child(valued("Usage", "9"))
            .with_child(valued("Mode", "0x101"))
            .with_child(valued("ColorID", "5").with_attr("index", "2"))
            .with_child(valued("ColorID", "6"))
            .with_child(ConfigNode::new("Source").with_child(valued("Slot", "1")));
        let js = ConfigNode::new("Joystick").with_child(out);
        let port = JoystickPort::from_joystick_node(&js, 1).unwrap();
        assert_eq!(port.out_maps()[0].colors, [0, 5, 6]);
        let bytes = port.compile().unwrap()[0].to_bytes();
        assert_eq!(
            bytes,
            vec![0x17, 0x40, 15, 0, 0x91, 0x01, 1, 0, 9, 0, 0, 0, 0, 0x01, 0, 5, 6, 1, 0, 0, 0]
        );
    }

    #[test]
    fn duplicate_explicit_color_is_rejected() {
        let out = ConfigNode::new("OutMap")
            .with_child(valued("ColorID", "1").with_attr("index", "1"))
            .with_child(valued("ColorID", "2").with_attr("index", "1"));
        let js = ConfigNode::new("Joystick").with_child(out);
        assert!(matches!(
            JoystickPort::from_joystick_node(&js, 0).unwrap_err(),
            ConfigError::Structure { .. }
        ));
    }

    #[test]
    fn fourth_color_is_rejected() {
        let out = (0..4).fold(ConfigNode::new("OutMap"), |n, i| {
            n.with_child(valued("ColorID", &i.to_string()))
        });
        let js = ConfigNode::new("Joystick").with_child(out);
        assert!(JoystickPort::from_joystick_node(&js, 0).is_err());
    }

    #[test]
    fn controls_auto_number_per_kind() {
        let js = ConfigNode::new("Joystick")
            .with_child(ConfigNode::new("InMap"))
            .with_child(ConfigNode::new("OutMap"))
            .with_child(ConfigNode::new("InMap").with_attr("control", "4"))
            .with_child(ConfigNode::new("InMap"));
        let port = JoystickPort::from_joystick_node(&js, 0).unwrap();
        let controls: Vec<u8> = port.in_maps().iter().map(|m| m.control).collect();
        assert_eq!(controls, vec![0, 4, 5]);
        assert_eq!(port.out_maps()[0].control, 0);
    }

    #[test]
    fn duplicate_control_is_rejected() {
        let js = ConfigNode::new("Joystick")
            .with_child(ConfigNode::new("InMap").with_attr("control", "1"))
            .with_child(ConfigNode::new("InMap").with_attr("control", "1"));
        assert!(matches!(
            JoystickPort::from_joystick_node(&js, 0).unwrap_err(),
            ConfigError::Collision { .. }
        ));
    }

    #[test]
    fn ports_index_and_persist_to_motherboard() {
        let node = ConfigNode::new("Joysticks")
            .with_child(
                ConfigNode::new("Port")
                    .with_child(valued("Name", "Left"))
                    .with_child(ConfigNode::new("Joystick").with_child(in_map())),
            )
            .with_child(ConfigNode::new("Port").with_attr("index", "3"));
        let joysticks = Joysticks::from_node(&node).unwrap();
        assert_eq!(joysticks.ports()[0].name, "Left");
        assert_eq!(joysticks.ports()[1].index, 3);

        let frames = joysticks.compile_persistent(true).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(
            frames[1],
            CommandFrame::persist(Address::Motherboard, 0, commands::MOD_SET_JOYSTICK_MAP_IN)
        );
        assert_eq!(
            frames[4],
            CommandFrame::persist(Address::Motherboard, 3, commands::MOD_SET_JOYSTICK_MAP_OUT)
        );
    }

    #[test]
    fn duplicate_port_index_is_rejected() {
        let node = ConfigNode::new("Joysticks")
            .with_child(ConfigNode::new("Port").with_attr("index", "1"))
            .with_child(ConfigNode::new("Port"))
            .with_child(ConfigNode::new("Port").with_attr("index", "2"));
        assert!(matches!(
            Joysticks::from_node(&node).unwrap_err(),
            ConfigError::Collision { first: 1, second: 2, .. }
        ));
    }
}
