//! Stepper stage parameters for one slot.
//!
//! A stage is described either by one `StageParameters` element with `Config`, `Drive`,
//! `Flags`, `Limit`, `Homing`, `Jog`, `Encoder`, `PID` and `Store` sections, or by a set
//! of `Struct` documents each holding one section under `Data`, tagged with a
//! [`StructId`]. Each present group of sections becomes one fixed-layout frame.

use std::path::Path;

use apt_link::{commands, Address, CommandFrame, HEADER_LEN};

use crate::serializer::{parse_float, parse_int, serialize, serialize_scaled_float, AttrKind};
use crate::{open_xml, Compile, ConfigError, ConfigNode, Persistable, Result};

const COUNTS_PER_UNIT_SCALE: u32 = 100_000;
const STAGE_FRAME_LEN: usize = 96;
const LIMIT_FRAME_LEN: usize = 30;
const HOME_FRAME_LEN: usize = 20;
const PID_FRAME_LEN: usize = 26;
const DEADBAND_FRAME_LEN: usize = 10;
const POSITIONS_FRAME_LEN: usize = 48;
const FIRST_FIELD: usize = 8;

/// Section tag carried by a `Struct` document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StructId {
    Encoder = 0,
    Limit = 1,
    Config = 2,
    Drive = 3,
    Flags = 4,
    Home = 5,
    Jog = 6,
    Pid = 7,
    Store = 8,
}

impl StructId {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => StructId::Encoder,
            1 => StructId::Limit,
            2 => StructId::Config,
            3 => StructId::Drive,
            4 => StructId::Flags,
            5 => StructId::Home,
            6 => StructId::Jog,
            7 => StructId::Pid,
            8 => StructId::Store,
            _ => return None,
        })
    }
}

#[derive(Default)]
struct Sections<'a> {
    config: Option<&'a ConfigNode>,
    drive: Option<&'a ConfigNode>,
    flags: Option<&'a ConfigNode>,
    limits: Option<&'a ConfigNode>,
    homing: Option<&'a ConfigNode>,
    jog: Option<&'a ConfigNode>,
    encoder: Option<&'a ConfigNode>,
    pid: Option<&'a ConfigNode>,
    store: Option<&'a ConfigNode>,
}

impl<'a> Sections<'a> {
    fn from_element(node: &'a ConfigNode) -> Self {
        Self {
            config: node.child("Config"),
            drive: node.child("Drive"),
            flags: node.child("Flags"),
            limits: node.child("Limit"),
            homing: node.child("Homing"),
            jog: node.child("Jog"),
            encoder: node.child("Encoder"),
            pid: node.child("PID"),
            store: node.child("Store"),
        }
    }

    fn from_segments(docs: &'a [ConfigNode]) -> Self {
        let mut s = Sections::default();
        for doc in docs {
            let (Some(sig), Some(data)) = (doc.select("/Struct/Signature"), doc.select("/Struct/Data"))
            else {
                tracing::debug!(node = %doc.location(), "not a struct segment, skipped");
                continue;
            };
            let Some(id) = sig
                .child("StructID")
                .and_then(|n| n.attr("value"))
                .and_then(parse_int)
                .and_then(StructId::from_raw)
            else {
                continue;
            };
            let slot = match id {
                StructId::Encoder => &mut s.encoder,
                StructId::Limit => &mut s.limits,
                StructId::Config => &mut s.config,
                StructId::Drive => &mut s.drive,
                StructId::Flags => &mut s.flags,
                StructId::Home => &mut s.homing,
                StructId::Jog => &mut s.jog,
                StructId::Pid => &mut s.pid,
                StructId::Store => &mut s.store,
            };
            *slot = Some(data);
        }
        s
    }
}

/// Fixed-size frame image that fields are serialized into at absolute offsets.
struct FrameImage {
    bytes: Vec<u8>,
}

impl FrameImage {
    fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    fn put(
        &mut self,
        section: &ConfigNode,
        xpath: &str,
        attr: &str,
        kind: AttrKind,
        offset: usize,
        width: usize,
    ) -> Result<()> {
        let node = section
            .select(xpath)
            .ok_or_else(|| ConfigError::missing(section, xpath))?;
        let data = serialize(node, attr, kind, width)?;
        self.write(section, offset, &data)
    }

    fn put_scaled(
        &mut self,
        section: &ConfigNode,
        xpath: &str,
        scale: u32,
        offset: usize,
        width: usize,
    ) -> Result<()> {
        let node = section
            .select(xpath)
            .ok_or_else(|| ConfigError::missing(section, xpath))?;
        let data = serialize_scaled_float(node, "value", scale, width)?;
        self.write(section, offset, &data)
    }

    fn write(&mut self, section: &ConfigNode, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset + data.len();
        let dst = self
            .bytes
            .get_mut(offset..end)
            .ok_or_else(|| {
                ConfigError::structure(section, format!("field at {offset} overruns frame"))
            })?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Turn the image into a frame for `slot`; the payload starts with the slot number.
    fn finish(mut self, command: u16, slot: u16) -> Result<CommandFrame> {
        self.bytes[HEADER_LEN..FIRST_FIELD].copy_from_slice(&slot.to_le_bytes());
        let payload = self.bytes.split_off(HEADER_LEN);
        Ok(CommandFrame::long(command, stage_address(slot)?, payload)?)
    }
}

fn stage_address(slot: u16) -> Result<Address> {
    Address::slot(slot).ok_or_else(|| ConfigError::MalformedValue {
        node: "/StageParameters".to_string(),
        field: "slot".to_string(),
        value: slot.to_string(),
    })
}

/// Parameters of the stepper stage fitted in one slot, compiled on load.
#[derive(Clone, Debug, PartialEq)]
pub struct StageParameters {
    slot: u16,
    nm_per_count: Option<f32>,
    frames: Vec<CommandFrame>,
}

impl StageParameters {
    pub fn from_node(node: &ConfigNode, slot: u16) -> Result<Self> {
        Self::build(Sections::from_element(node), slot)
    }

    /// Read a stand-alone file whose root is `StageParameters`.
    pub fn load(path: impl AsRef<Path>, slot: u16) -> Result<Self> {
        let root = open_xml(path)?;
        let stage = root
            .select("/StageParameters")
            .ok_or_else(|| ConfigError::missing(&root, "StageParameters"))?;
        Self::from_node(stage, slot)
    }

    /// Assemble a stage from `Struct` segment documents. Later segments with the same
    /// id replace earlier ones.
    pub fn from_segments(docs: &[ConfigNode], slot: u16) -> Result<Self> {
        Self::build(Sections::from_segments(docs), slot)
    }

    pub fn load_segments<P: AsRef<Path>>(paths: &[P], slot: u16) -> Result<Self> {
        let docs = paths
            .iter()
            .map(|p| open_xml(p))
            .collect::<Result<Vec<_>>>()?;
        Self::from_segments(&docs, slot)
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// Encoder resolution, when the stage declares one.
    pub fn nm_per_count(&self) -> Option<f32> {
        self.nm_per_count
    }

    fn build(s: Sections<'_>, slot: u16) -> Result<Self> {
        stage_address(slot)?;
        let mut frames = Vec::new();
        if let (Some(config), Some(drive), Some(flags), Some(encoder)) =
            (s.config, s.drive, s.flags, s.encoder)
        {
            frames.push(stage_frame(config, drive, flags, encoder, slot)?);
        }
        if let Some(limits) = s.limits {
            frames.push(limit_frame(limits, slot)?);
        }
        if let Some(homing) = s.homing {
            frames.push(home_frame(homing, slot)?);
        }
        if let Some(pid) = s.pid {
            frames.push(pid_frame(pid, slot)?);
        }
        if let Some(store) = s.store {
            frames.push(deadband_frame(store, slot)?);
            frames.push(positions_frame(store, slot)?);
        }
        if s.jog.is_some() {
            tracing::debug!(slot, "jog section has no frame of its own");
        }
        let nm_per_count = s
            .encoder
            .and_then(|e| e.child("NmPerCount"))
            .and_then(|n| n.attr("value"))
            .and_then(parse_float);
        Ok(Self {
            slot,
            nm_per_count,
            frames,
        })
    }
}

impl Compile for StageParameters {
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        Ok(self.frames.clone())
    }
}

impl Persistable for StageParameters {
    fn persist_target(&self) -> (Address, u16) {
        (Address::Slot((self.slot - 1) as u8), 0)
    }
}

fn stage_frame(
    config: &ConfigNode,
    drive: &ConfigNode,
    flags: &ConfigNode,
    encoder: &ConfigNode,
    slot: u16,
) -> Result<CommandFrame> {
    use AttrKind::{Float, Int, Uint};
    let mut f = FrameImage::new(STAGE_FRAME_LEN);
    f.put(config, "AxisSerial", "value", Uint, 28, 4)?;
    f.put_scaled(config, "CountsPerUnit", COUNTS_PER_UNIT_SCALE, 32, 4)?;
    f.put(config, "Position", "min", Int, 36, 4)?;
    f.put(config, "Position", "max", Int, 40, 4)?;
    f.put(drive, "Acceleration", "max", Int, 44, 4)?;
    f.put(drive, "Acceleration", "min", Int, 48, 4)?;
    f.put(drive, "Speed", "max", Int, 52, 4)?;
    f.put(drive, "Speed", "min", Int, 56, 2)?;
    f.put(drive, "FullStepSpeed", "value", Int, 58, 2)?;
    f.put(drive, "KVal/Hold", "value", Uint, 60, 1)?;
    f.put(drive, "KVal/Run", "value", Uint, 61, 1)?;
    f.put(drive, "KVal/Accel", "value", Uint, 62, 1)?;
    f.put(drive, "KVal/Decel", "value", Uint, 63, 1)?;
    f.put(drive, "IntersectSpeed", "value", Int, 64, 2)?;
    f.put(drive, "StallThreshold", "value", Uint, 66, 1)?;
    f.put(drive, "Slope/Start", "value", Uint, 67, 1)?;
    f.put(drive, "Slope/FinalAccel", "value", Uint, 68, 1)?;
    f.put(drive, "Slope/FinalDecel", "value", Uint, 69, 1)?;
    f.put(drive, "OCDThreshold", "value", Uint, 70, 1)?;
    f.put(drive, "StepMode", "value", Uint, 71, 1)?;
    f.put(drive, "ICConfig", "value", Int, 72, 2)?;
    f.put(encoder, "NmPerCount", "value", Float, 74, 4)?;
    f.put(drive, "GateDriverConfig", "value", Int, 78, 3)?;
    f.put(drive, "ApproachVelocity", "value", Int, 81, 2)?;
    f.put(drive, "Deadband", "value", Int, 83, 2)?;
    f.put(drive, "Backlash", "value", Int, 85, 2)?;
    f.put(drive, "KickoutTime", "value", Uint, 87, 1)?;
    f.put(flags, "Flags", "value", Uint, 88, 1)?;
    f.put(config, "CollisionThreshold", "value", Int, 89, 2)?;
    f.put(encoder, "EncoderType", "value", Uint, 91, 1)?;
    f.put(encoder, "IndexDelta", "min", Uint, 92, 2)?;
    f.put(encoder, "IndexDelta", "step", Uint, 94, 2)?;
    f.finish(commands::MCM_SET_STAGEPARAMS, slot)
}

fn limit_frame(limits: &ConfigNode, slot: u16) -> Result<CommandFrame> {
    use AttrKind::{Int, Uint};
    let mut f = FrameImage::new(LIMIT_FRAME_LEN);
    f.put(limits, "HardLimit", "cw", Uint, 8, 2)?;
    f.put(limits, "HardLimit", "ccw", Uint, 10, 2)?;
    f.put(limits, "SoftLimit", "cw", Int, 12, 4)?;
    f.put(limits, "SoftLimit", "ccw", Int, 16, 4)?;
    f.put(limits, "AbsLimit", "high", Int, 20, 4)?;
    f.put(limits, "AbsLimit", "low", Int, 24, 4)?;
    f.put(limits, "Mode", "value", Uint, 28, 2)?;
    f.finish(commands::MCM_MOT_SET_LIMSWITCHPARAMS, slot)
}

fn home_frame(homing: &ConfigNode, slot: u16) -> Result<CommandFrame> {
    use AttrKind::{Int, Uint};
    let mut f = FrameImage::new(HOME_FRAME_LEN);
    f.put(homing, "Mode", "value", Uint, 8, 1)?;
    f.put(homing, "Direction", "value", Uint, 9, 1)?;
    f.put(homing, "LimitSwitch", "value", Uint, 10, 2)?;
    f.put(homing, "Velocity", "value", Uint, 12, 4)?;
    f.put(homing, "OffsetDistance", "value", Int, 16, 4)?;
    f.finish(commands::MCM_SET_HOMEPARAMS, slot)
}

fn pid_frame(pid: &ConfigNode, slot: u16) -> Result<CommandFrame> {
    let mut f = FrameImage::new(PID_FRAME_LEN);
    for (name, offset) in [("Kp", 8), ("Ki", 12), ("Kd", 16), ("IMax", 20)] {
        f.put(pid, name, "value", AttrKind::Int, offset, 4)?;
    }
    f.put(pid, "FilterControl", "value", AttrKind::Int, 24, 2)?;
    f.finish(commands::MOT_SET_DCPIDPARAMS, slot)
}

fn deadband_frame(store: &ConfigNode, slot: u16) -> Result<CommandFrame> {
    let mut f = FrameImage::new(DEADBAND_FRAME_LEN);
    f.put(store, "Deadband", "value", AttrKind::Uint, 8, 2)?;
    f.finish(commands::SET_STORE_POSITION_DEADBAND, slot)
}

/// Saved positions are written at a cursor that an `index` attribute can move.
fn positions_frame(store: &ConfigNode, slot: u16) -> Result<CommandFrame> {
    let mut f = FrameImage::new(POSITIONS_FRAME_LEN);
    let mut cursor = FIRST_FIELD;
    for pos in store.children_named("Position") {
        if let Some(raw) = pos.attr("index") {
            cursor = parse_int(raw)
                .and_then(|i| usize::try_from(i).ok())
                .map(|i| 4 + i * 4)
                .filter(|c| *c >= FIRST_FIELD)
                .ok_or_else(|| ConfigError::malformed(pos, "index", raw))?;
        }
        if cursor + 4 > POSITIONS_FRAME_LEN {
            return Err(ConfigError::structure(pos, "saved position outside the table"));
        }
        let raw = pos
            .attr("value")
            .ok_or_else(|| ConfigError::missing(pos, "value"))?;
        let value = parse_int(raw).ok_or_else(|| ConfigError::malformed(pos, "value", raw))?;
        f.write(pos, cursor, &value.to_le_bytes())?;
        cursor += 4;
    }
    f.finish(commands::SET_STORE_POSITION, slot)
}

/// Encoder counts covering `distance_nm` at a resolution of `nm_per_count`, rounded to
/// the nearest count. `None` for a non-positive resolution or an out-of-range result.
pub fn counts_for_distance(distance_nm: f64, nm_per_count: f32) -> Option<i32> {
    let resolution = f64::from(nm_per_count);
    if resolution.is_nan() || resolution <= 0.0 {
        return None;
    }
    let counts = (distance_nm / resolution).round();
    if counts.is_finite() && counts >= f64::from(i32::MIN) && counts <= f64::from(i32::MAX) {
        Some(counts as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str, value: &str) -> ConfigNode {
        ConfigNode::new(name).with_attr("value", value)
    }

    fn range(name: &str, lo: (&str, &str), hi: (&str, &str)) -> ConfigNode {
        ConfigNode::new(name).with_attr(lo.0, lo.1).with_attr(hi.0, hi.1)
    }

    fn config() -> ConfigNode {
        ConfigNode::new("Config")
            .with_child(v("AxisSerial", "0x00ABCDEF"))
            .with_child(v("CountsPerUnit", "1.5"))
            .with_child(range("Position", ("min", "-100"), ("max", "200000")))
            .with_child(v("CollisionThreshold", "12"))
    }

    fn drive() -> ConfigNode {
        let kval = ConfigNode::new("KVal")
            .with_child(v("Hold", "10"))
            .with_child(v("Run", "20"))
            .with_child(v("Accel", "30"))
            .with_child(v("Decel", "40"));
        let slope = ConfigNode::new("Slope")
            .with_child(v("Start", "1"))
            .with_child(v("FinalAccel", "2"))
            .with_child(v("FinalDecel", "3"));
        ConfigNode::new("Drive")
            .with_child(range("Acceleration", ("min", "5"), ("max", "500")))
            .with_child(range("Speed", ("min", "7"), ("max", "7000")))
            .with_child(v("FullStepSpeed", "900"))
            .with_child(kval)
            .with_child(v("IntersectSpeed", "61"))
            .with_child(v("StallThreshold", "4"))
            .with_child(slope)
            .with_child(v("OCDThreshold", "8"))
            .with_child(v("StepMode", "7"))
            .with_child(v("ICConfig", "11912"))
            .with_child(v("GateDriverConfig", "12543"))
            .with_child(v("ApproachVelocity", "100"))
            .with_child(v("Deadband", "2"))
            .with_child(v("Backlash", "-5"))
            .with_child(v("KickoutTime", "9"))
    }

    fn encoder() -> ConfigNode {
        ConfigNode::new("Encoder")
            .with_child(v("NmPerCount", "2.5"))
            .with_child(v("EncoderType", "1"))
            .with_child(range("IndexDelta", ("min", "3"), ("step", "4")))
    }

    fn stage() -> ConfigNode {
        ConfigNode::new("StageParameters")
            .with_child(config())
            .with_child(drive())
            .with_child(ConfigNode::new("Flags").with_child(v("Flags", "0x05")))
            .with_child(encoder())
    }

    #[test]
    fn stage_frame_offsets() {
        let params = StageParameters::from_node(&stage(), 3).unwrap();
        let frames = params.compile().unwrap();
        assert_eq!(frames.len(), 1);
        let b = frames[0].to_bytes();
        assert_eq!(b.len(), 96);
        assert_eq!(&b[0..6], &[0x41, 0x40, 90, 0, 0xA3, 0x01]);
        assert_eq!(&b[6..8], &[3, 0]);
        assert_eq!(&b[28..32], &0x00AB_CDEFu32.to_le_bytes());
        assert_eq!(&b[32..36], &150_000u32.to_le_bytes());
        assert_eq!(&b[36..40], &(-100i32).to_le_bytes());
        assert_eq!(&b[40..44], &200_000i32.to_le_bytes());
        assert_eq!(&b[44..48], &500i32.to_le_bytes());
        assert_eq!(&b[56..58], &7u16.to_le_bytes());
        assert_eq!(&b[60..64], &[10, 20, 30, 40]);
        assert_eq!(&b[66..72], &[4, 1, 2, 3, 8, 7]);
        assert_eq!(&b[72..74], &0x2E88u16.to_le_bytes());
        assert_eq!(&b[74..78], &2.5f32.to_le_bytes());
        assert_eq!(&b[78..81], &[0xFF, 0x30, 0x00]);
        assert_eq!(&b[85..87], &(-5i16).to_le_bytes());
        assert_eq!(b[87], 9);
        assert_eq!(b[88], 5);
        assert_eq!(&b[89..91], &[12, 0]);
        assert_eq!(&b[91..96], &[1, 3, 0, 4, 0]);
        assert_eq!(params.nm_per_count(), Some(2.5));
    }

    #[test]
    fn incomplete_stage_group_emits_no_stage_frame() {
        let node = ConfigNode::new("StageParameters")
            .with_child(config())
            .with_child(ConfigNode::new("Store").with_child(v("Deadband", "3")));
        let frames = StageParameters::from_node(&node, 1).unwrap().compile().unwrap();
        let ids: Vec<u16> = frames.iter().map(|f| f.command_id).collect();
        assert_eq!(
            ids,
            vec![commands::SET_STORE_POSITION_DEADBAND, commands::SET_STORE_POSITION]
        );
    }

    #[test]
    fn missing_field_names_its_section() {
        let node = ConfigNode::new("StageParameters")
            .with_child(ConfigNode::new("Homing").with_child(v("Mode", "1")));
        let err = StageParameters::from_node(&node, 1).unwrap_err();
        assert_eq!(err.to_string(), "/StageParameters/Homing: missing Direction");
    }

    #[test]
    fn saved_positions_follow_the_cursor() {
        let store = ConfigNode::new("Store")
            .with_child(v("Deadband", "3"))
            .with_child(v("Position", "100"))
            .with_child(v("Position", "-1").with_attr("index", "5"))
            .with_child(v("Position", "7"));
        let node = ConfigNode::new("StageParameters").with_child(store);
        let frames = StageParameters::from_node(&node, 2).unwrap().compile().unwrap();
        let b = frames[1].to_bytes();
        assert_eq!(b.len(), 48);
        assert_eq!(&b[8..12], &100i32.to_le_bytes());
        assert_eq!(&b[24..28], &(-1i32).to_le_bytes());
        assert_eq!(&b[28..32], &7i32.to_le_bytes());
        assert_eq!(frames[0].payload(), &[2, 0, 3, 0]);
    }

    #[test]
    fn saved_position_outside_table_is_rejected() {
        let store = ConfigNode::new("Store")
            .with_child(v("Deadband", "3"))
            .with_child(v("Position", "1").with_attr("index", "11"));
        let node = ConfigNode::new("StageParameters").with_child(store);
        assert!(StageParameters::from_node(&node, 1).is_err());
    }

    #[test]
    fn segments_assemble_a_stage() {
        let seg = |id: &str, data: ConfigNode| {
            ConfigNode::new("Struct")
                .with_child(ConfigNode::new("Signature").with_child(v("StructID", id)))
                .with_child(data)
        };
        let rename = |n: ConfigNode| {
            n.children()
                .iter()
                .cloned()
                .fold(ConfigNode::new("Data"), |d, c| d.with_child(c))
        };
        let docs = vec![
            seg("2", rename(config())),
            seg("3", rename(drive())),
            seg("4", ConfigNode::new("Data").with_child(v("Flags", "5"))),
            seg("0", rename(encoder())),
            seg("7", ConfigNode::new("Data")
                .with_child(v("Kp", "1"))
                .with_child(v("Ki", "2"))
                .with_child(v("Kd", "3"))
                .with_child(v("IMax", "4"))
                .with_child(v("FilterControl", "5"))),
        ];
        let from_segments = StageParameters::from_segments(&docs, 3).unwrap();
        let frames = from_segments.compile().unwrap();
        assert_eq!(frames.len(), 2);
        let whole = StageParameters::from_node(&stage(), 3).unwrap().compile().unwrap();
        assert_eq!(frames[0], whole[0]);
        assert_eq!(frames[1].command_id, commands::MOT_SET_DCPIDPARAMS);
        assert_eq!(&frames[1].payload()[2..], &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0, 5, 0]);
    }

    #[test]
    fn persist_frames_address_the_slot() {
        let node = ConfigNode::new("StageParameters")
            .with_child(ConfigNode::new("Store").with_child(v("Deadband", "3")));
        let frames = StageParameters::from_node(&node, 4)
            .unwrap()
            .compile_persistent(true)
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames[2].to_bytes(),
            vec![0xB9, 0x04, 4, 0, 0xA4, 0x01, 0, 0, 0x1D, 0x40]
        );
        assert_eq!(
            frames[3],
            CommandFrame::persist(Address::Slot(3), 0, commands::SET_STORE_POSITION)
        );
    }

    #[test]
    fn counts_for_distance_uses_given_resolution() {
        assert_eq!(counts_for_distance(1000.0, 2.5), Some(400));
        assert_eq!(counts_for_distance(-3.0, 2.0), Some(-2));
        assert_eq!(counts_for_distance(10.0, 0.0), None);
    }

    #[test]
    fn bad_slot_is_rejected() {
        assert!(StageParameters::from_node(&stage(), 0).is_err());
    }
}
