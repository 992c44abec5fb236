use std::path::Path;

use apt_link::{commands, Address, CommandFrame};

use crate::resolver::{self, Collideable};
use crate::serializer::{attr_u16, parse_u16, parse_u64};
use crate::{open_xml, Compile, ConfigError, ConfigNode, Result};

/// Serial number a lock carries when it does not restrict the slot.
pub const UNRESTRICTED_SERIAL: u64 = 0xFFFF_0000_0000_0000;

/// Identifies a device type: its default slot type and device id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Signature {
    pub slot_type: u16,
    pub device_id: u16,
}

impl Signature {
    pub fn new(slot_type: u16, device_id: u16) -> Self {
        Self {
            slot_type,
            device_id,
        }
    }

    fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut sig = Signature::new(u16::MAX, u16::MAX);
        for child in node.children() {
            match child.name() {
                "DefaultSlotType" => sig.slot_type = attr_u16(child, "value")?,
                "DeviceID" => sig.device_id = attr_u16(child, "value")?,
                _ => {}
            }
        }
        Ok(sig)
    }
}

/// A device type and the slots it may be plugged into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AllowedDevice {
    pub signature: Signature,
    /// 1-based slots, without duplicates, in declaration order.
    pub slots: Vec<u16>,
}

impl AllowedDevice {
    pub fn new(signature: Signature, slots: impl IntoIterator<Item = u16>) -> Self {
        let mut device = Self {
            signature,
            slots: Vec::new(),
        };
        device.allow(slots);
        device
    }

    fn allow(&mut self, slots: impl IntoIterator<Item = u16>) {
        for slot in slots {
            if !self.slots.contains(&slot) {
                self.slots.push(slot);
            }
        }
    }

    fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut signature = Signature::new(u16::MAX, u16::MAX);
        let mut slots = Vec::new();
        for child in node.children() {
            match child.name() {
                "Signature" => signature = Signature::from_node(child)?,
                "Allow" => slots.push(slot_attr(child)?),
                _ => {}
            }
        }
        Ok(Self::new(signature, slots))
    }

    /// Merge two declarations of the same signature.
    pub fn merge(mut self, other: Self) -> Self {
        self.allow(other.slots);
        self
    }
}

impl Collideable for AllowedDevice {
    fn collides_with(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

/// Pins a slot to one device serial number, or explicitly to none.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceLock {
    /// 1-based slot.
    pub slot: u16,
    pub serial: Option<u64>,
}

impl DeviceLock {
    fn from_node(node: &ConfigNode) -> Result<Self> {
        let slot = slot_attr(node)?;
        let enabled = node
            .attr("enabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let serial = if enabled {
            let raw = node.attr("sn").ok_or_else(|| ConfigError::missing(node, "sn"))?;
            Some(parse_u64(raw).ok_or_else(|| ConfigError::malformed(node, "sn", raw))?)
        } else {
            None
        };
        Ok(Self { slot, serial })
    }

    fn frame(&self) -> Result<CommandFrame> {
        let mut payload = Vec::with_capacity(10);
        payload.extend_from_slice(&(self.slot - 1).to_le_bytes());
        payload.extend_from_slice(&self.serial.unwrap_or(UNRESTRICTED_SERIAL).to_le_bytes());
        Ok(CommandFrame::long(
            commands::SET_DEVICE_BOARD,
            Address::Motherboard,
            payload,
        )?)
    }
}

impl Collideable for DeviceLock {
    fn collides_with(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

fn slot_attr(node: &ConfigNode) -> Result<u16> {
    let raw = node
        .attr("slot")
        .ok_or_else(|| ConfigError::missing(node, "slot"))?;
    parse_u16(raw)
        .filter(|s| Address::slot(*s).is_some())
        .ok_or_else(|| ConfigError::malformed(node, "slot", raw))
}

/// The `AllowedDevices` element: per-slot device allow lists and serial-number locks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllowedDevices {
    devices: Vec<AllowedDevice>,
    locks: Vec<DeviceLock>,
}

impl AllowedDevices {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_node(&open_xml(path)?)
    }

    pub fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut devices = Vec::new();
        let mut locks = Vec::new();
        for child in node.children() {
            match child.name() {
                "Device" => devices.push(AllowedDevice::from_node(child)?),
                "DeviceLock" => locks.push(DeviceLock::from_node(child)?),
                _ => {}
            }
        }
        let devices = resolver::union(devices, AllowedDevice::merge)
            .map_err(|c| ConfigError::collision(node, "device signature", c))?;
        let locks = resolver::unique(locks)
            .map_err(|c| ConfigError::collision(node, "device lock slot", c))?;
        Ok(Self { devices, locks })
    }

    pub fn devices(&self) -> &[AllowedDevice] {
        &self.devices
    }

    pub fn locks(&self) -> &[DeviceLock] {
        &self.locks
    }

    /// Slots named by any device, in first-appearance order.
    pub fn slots_used(&self) -> Vec<u16> {
        let mut slots = Vec::new();
        for d in &self.devices {
            for s in &d.slots {
                if !slots.contains(s) {
                    slots.push(*s);
                }
            }
        }
        slots
    }

    /// Signatures allowed in `slot`, in device order.
    pub fn allowed_in(&self, slot: u16) -> impl Iterator<Item = Signature> + '_ {
        self.devices
            .iter()
            .filter(move |d| d.slots.contains(&slot))
            .map(|d| d.signature)
    }
}

impl Compile for AllowedDevices {
    /// One allow-list frame per used slot, then one frame per lock.
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        let mut frames = Vec::new();
        for slot in self.slots_used() {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(slot - 1).to_le_bytes());
            for sig in self.allowed_in(slot) {
                payload.extend_from_slice(&sig.slot_type.to_le_bytes());
                payload.extend_from_slice(&sig.device_id.to_le_bytes());
            }
            frames.push(CommandFrame::long(
                commands::MCM_SET_ALLOWED_DEVICES,
                Address::Motherboard,
                payload,
            )?);
        }
        for lock in &self.locks {
            frames.push(lock.frame()?);
        }
        Ok(frames)
    }
}
