//! Flipper/shutter channel parameters.
//!
//! A channel whose description is incomplete or out of range is skipped with a warning
//! rather than failing the whole load: the rest of the chassis is still configured.

use std::time::Duration;

use apt_link::{commands, Address, CommandFrame};

use crate::{Compile, ConfigError, ConfigNode, Persistable, Result};

const SHUTTER_PAYLOAD: usize = 19;
const MAX_VOLTAGE: f64 = 24.0;
/// Full-scale PWM count for a 100% duty cycle.
const DUTY_FULL_SCALE: f64 = 1900.0;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident {
        $($variant:ident = $wire:literal => $canon:literal $(| $alias:literal)*),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Parse the configuration spelling; several spellings may share a variant.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($canon $(| $alias)* => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Canonical configuration spelling.
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $canon),+
                }
            }

            pub fn wire(self) -> u8 {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            pub fn from_wire(raw: u8) -> Option<Self> {
                match raw {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum!(
    /// Position a shutter takes at power-up.
    ShutterState {
        Open = 0 => "OPEN",
        Closed = 1 => "CLOSED",
        Unknown = 2 => "UNKNOWN",
    }
);

wire_enum!(
    /// Drive scheme of the shutter solenoid.
    ShutterType {
        Pulsed = 1 => "PULSED",
        BidirectionalPulseHold = 2 => "BIDIRECTIONAL PULSE HOLD" | "PULSE HOLD",
        UnidirectionalPulseHold = 3 => "UNIDIRECTION PULSE HOLD" | "NO RETURN" | "NO REVERSE",
    }
);

wire_enum!(
    /// How the external trigger input drives the shutter.
    TriggerMode {
        Disabled = 0 => "DISABLED",
        Enabled = 1 => "ENABLED",
        Inverted = 2 => "INVERTED",
    }
);

/// Validated parameters of one shutter channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ShutterParams {
    pub power_up: ShutterState,
    pub shutter_type: ShutterType,
    pub trigger: TriggerMode,
    pub on_time: Duration,
    /// Duty cycles in percent of full scale.
    pub pulse_duty: f64,
    pub hold_duty: f64,
    pub open_uses_negative_voltage: bool,
    pub holdoff: Duration,
}

impl ShutterParams {
    pub fn from_node(node: &ConfigNode) -> Result<Self> {
        let power_up = enum_value(node, "PowerUpPosition", ShutterState::from_name)?;
        let trigger = enum_value(node, "TriggerMode", TriggerMode::from_name)?;
        let shutter_type = enum_value(node, "Type", ShutterType::from_name)?;

        let on_time = float_value(node, "OnTimeSeconds")?;
        if on_time <= 0.0 {
            return Err(out_of_range(node, "OnTimeSeconds", on_time));
        }
        let pulse_duty = duty_for_voltage(node, "PulseVoltage")?;
        let hold_duty = duty_for_voltage(node, "HoldVoltage")?;

        let open_uses_negative_voltage = match node.child("OpenUsesNegativeVoltage") {
            Some(n) => {
                let raw = value_attr(n)?;
                parse_switch(raw).ok_or_else(|| ConfigError::malformed(n, "value", raw))?
            }
            None => false,
        };
        let holdoff = match node.child("HoldoffTimeSeconds") {
            Some(_) => float_value(node, "HoldoffTimeSeconds")?,
            None => 0.0,
        };

        Ok(Self {
            power_up,
            shutter_type,
            trigger,
            on_time: seconds(node, "OnTimeSeconds", on_time)?,
            pulse_duty,
            hold_duty,
            open_uses_negative_voltage,
            holdoff: seconds(node, "HoldoffTimeSeconds", holdoff)?,
        })
    }

    /// On-time in units of 10 ms, rounded up.
    pub fn on_time_ticks(&self) -> Option<u8> {
        let ticks = (self.on_time.as_secs_f64() * 1000.0 / 10.0).ceil();
        (ticks <= f64::from(u8::MAX)).then_some(ticks as u8)
    }

    /// Holdoff in tenths of a millisecond, rounded up.
    pub fn holdoff_ticks(&self) -> u32 {
        let ticks = (self.holdoff.as_secs_f64() * 1000.0 * 10.0).ceil();
        ticks.min(f64::from(u32::MAX)) as u32
    }

    fn duty_counts(percent: f64) -> u32 {
        (DUTY_FULL_SCALE * percent / 100.0).floor() as u32
    }

    pub fn payload(&self, channel: u16) -> Option<Vec<u8>> {
        let mut p = Vec::with_capacity(SHUTTER_PAYLOAD);
        p.extend_from_slice(&channel.to_le_bytes());
        p.push(self.power_up.wire());
        p.push(self.shutter_type.wire());
        p.push(self.trigger.wire());
        p.push(self.on_time_ticks()?);
        p.extend_from_slice(&Self::duty_counts(self.pulse_duty).to_le_bytes());
        p.extend_from_slice(&Self::duty_counts(self.hold_duty).to_le_bytes());
        p.push(u8::from(self.open_uses_negative_voltage));
        p.extend_from_slice(&self.holdoff_ticks().to_le_bytes());
        Some(p)
    }
}

fn value_attr(node: &ConfigNode) -> Result<&str> {
    node.attr("value")
        .ok_or_else(|| ConfigError::missing(node, "value"))
}

fn required<'a>(node: &'a ConfigNode, name: &str) -> Result<&'a ConfigNode> {
    node.child(name)
        .ok_or_else(|| ConfigError::missing(node, name))
}

fn enum_value<T>(node: &ConfigNode, name: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let n = required(node, name)?;
    let raw = value_attr(n)?;
    parse(raw).ok_or_else(|| ConfigError::unsupported(n, name, raw))
}

fn float_value(node: &ConfigNode, name: &str) -> Result<f64> {
    let n = required(node, name)?;
    let raw = value_attr(n)?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::malformed(n, "value", raw))
}

fn duty_for_voltage(node: &ConfigNode, name: &str) -> Result<f64> {
    let volts = float_value(node, name)?;
    if !(0.0..=MAX_VOLTAGE).contains(&volts) {
        return Err(out_of_range(node, name, volts));
    }
    Ok(100.0 * volts / MAX_VOLTAGE)
}

fn seconds(node: &ConfigNode, name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| out_of_range(node, name, secs))
}

fn out_of_range(node: &ConfigNode, name: &str, value: f64) -> ConfigError {
    ConfigError::MalformedValue {
        node: node.location(),
        field: name.to_string(),
        value: value.to_string(),
    }
}

/// Boolean switch spellings accepted for optional flags.
fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// One `Shutter` of a flipper/shutter card.
#[derive(Clone, Debug, PartialEq)]
pub struct ShutterChannelConfig {
    slot: u16,
    channel: u16,
    params: Option<ShutterParams>,
}

impl ShutterChannelConfig {
    /// Parse a channel. Invalid parameters leave the channel unconfigured.
    pub fn from_node(node: &ConfigNode, slot: u16, channel: u16) -> Result<Self> {
        if Address::slot(slot).is_none() {
            return Err(ConfigError::malformed(node, "slot", slot.to_string()));
        }
        let params = match ShutterParams::from_node(node) {
            Ok(p) if p.on_time_ticks().is_some() => Some(p),
            Ok(p) => {
                tracing::warn!(
                    node = %node.location(),
                    on_time = ?p.on_time,
                    "shutter on-time too long, channel left unconfigured"
                );
                None
            }
            Err(e) => {
                tracing::warn!(slot, channel, error = %e, "shutter channel left unconfigured");
                None
            }
        };
        Ok(Self {
            slot,
            channel,
            params,
        })
    }

    pub fn with_params(slot: u16, channel: u16, params: ShutterParams) -> Self {
        Self {
            slot,
            channel,
            params: Some(params),
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn params(&self) -> Option<&ShutterParams> {
        self.params.as_ref()
    }

    fn address(&self) -> Address {
        Address::slot(self.slot).unwrap_or(Address::Slot(0))
    }
}

impl Compile for ShutterChannelConfig {
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        let Some(payload) = self.params.as_ref().and_then(|p| p.payload(self.channel)) else {
            return Ok(Vec::new());
        };
        Ok(vec![CommandFrame::long(
            commands::MCM_SET_SHUTTERPARAMS,
            self.address(),
            payload,
        )?])
    }
}

impl Persistable for ShutterChannelConfig {
    fn persist_target(&self) -> (Address, u16) {
        (self.address(), self.channel)
    }
}
