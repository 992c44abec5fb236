//! Provisioning: stream a compiled [`SystemConfig`] to the controller.
//!
//! Everything is compiled before the first frame leaves, so a configuration error never
//! leaves the controller half configured. Frames are fire-and-forget; the controller
//! applies them in arrival order, which makes the stage order below part of the contract.

use std::fmt;
use std::thread;
use std::time::Duration;

use apt_link::{commands, CommandFrame, FrameSink};

use crate::{Compile, CompileMetrics, Result, SystemConfig};

/// Provisioning stages, in the order they are sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    Cards,
    AllowedDevices,
    CustomConfigs,
    Joysticks,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::Cards,
        Stage::AllowedDevices,
        Stage::CustomConfigs,
        Stage::Joysticks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Cards => "cards",
            Stage::AllowedDevices => "allowed_devices",
            Stage::CustomConfigs => "custom_configs",
            Stage::Joysticks => "joysticks",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug)]
pub struct ProvisionOptions {
    pub cards: bool,
    pub allowed_devices: bool,
    pub custom_configs: bool,
    pub joysticks: bool,
    /// Append commit-to-storage frames for custom configs and joystick ports.
    pub persist: bool,
    /// Pause after each non-empty stage, giving the controller time to act on it.
    pub stage_pause: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            cards: true,
            allowed_devices: true,
            custom_configs: true,
            joysticks: true,
            persist: true,
            stage_pause: Duration::ZERO,
        }
    }
}

impl ProvisionOptions {
    pub fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Cards => self.cards,
            Stage::AllowedDevices => self.allowed_devices,
            Stage::CustomConfigs => self.custom_configs,
            Stage::Joysticks => self.joysticks,
        }
    }

    /// Enable only the listed stages.
    pub fn only(stages: &[Stage]) -> Self {
        Self {
            cards: stages.contains(&Stage::Cards),
            allowed_devices: stages.contains(&Stage::AllowedDevices),
            custom_configs: stages.contains(&Stage::CustomConfigs),
            joysticks: stages.contains(&Stage::Joysticks),
            ..Self::default()
        }
    }
}

/// Frames compiled for one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StagePlan {
    pub stage: Stage,
    pub entities: usize,
    pub frames: Vec<CommandFrame>,
}

impl StagePlan {
    pub fn persist_frames(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.command_id == commands::MOT_SET_EEPROMPARAMS)
            .count()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvisionReport {
    /// (stage, entities, frames sent) for each stage that ran.
    pub stages: Vec<(Stage, usize, usize)>,
    pub frames_sent: usize,
    pub persist_frames_sent: usize,
}

impl ProvisionReport {
    pub fn record(&self, metrics: &CompileMetrics) {
        metrics.frames_sent.inc_by(self.frames_sent as u64);
        metrics.persist_frames_sent.inc_by(self.persist_frames_sent as u64);
        for (stage, entities, _) in &self.stages {
            metrics
                .entities_compiled
                .with_label_values(&[stage.name()])
                .inc_by(*entities as u64);
        }
    }
}

/// Compile every enabled stage of `system`, in send order. Absent sections yield no plan.
pub fn plan(system: &SystemConfig, options: &ProvisionOptions) -> Result<Vec<StagePlan>> {
    let mut plans = Vec::new();
    for stage in Stage::ORDER {
        if !options.enabled(stage) {
            continue;
        }
        let planned = match stage {
            Stage::Cards => system.settings.as_ref().map(|s| -> Result<_> {
                Ok((s.cards().len(), s.compile()?))
            }),
            Stage::AllowedDevices => system.allowed_devices.as_ref().map(|a| -> Result<_> {
                Ok((a.devices().len() + a.locks().len(), a.compile()?))
            }),
            Stage::CustomConfigs => system.settings.as_ref().map(|s| -> Result<_> {
                let mut frames = Vec::new();
                let mut entities = 0;
                for custom in s.custom_configs() {
                    frames.extend(custom.compile_persistent(options.persist)?);
                    entities += 1;
                }
                Ok((entities, frames))
            }),
            Stage::Joysticks => system.joysticks.as_ref().map(|j| -> Result<_> {
                Ok((j.ports().len(), j.compile_persistent(options.persist)?))
            }),
        };
        if let Some(planned) = planned {
            let (entities, frames) = planned?;
            plans.push(StagePlan {
                stage,
                entities,
                frames,
            });
        }
    }
    Ok(plans)
}

/// Compile `system` and send its frames through `sink`, stage by stage.
pub fn configure<S: FrameSink + ?Sized>(
    system: &SystemConfig,
    sink: &mut S,
    options: &ProvisionOptions,
) -> Result<ProvisionReport> {
    let plans = plan(system, options)?;
    send_plans(&plans, sink, options.stage_pause)
}

/// Send already compiled stages.
pub fn send_plans<S: FrameSink + ?Sized>(
    plans: &[StagePlan],
    sink: &mut S,
    stage_pause: Duration,
) -> Result<ProvisionReport> {
    let mut report = ProvisionReport::default();
    for plan in plans {
        tracing::info!(
            stage = %plan.stage,
            entities = plan.entities,
            frames = plan.frames.len(),
            "provisioning stage"
        );
        for frame in &plan.frames {
            sink.send_frame(frame)?;
        }
        report.frames_sent += plan.frames.len();
        report.persist_frames_sent += plan.persist_frames();
        report
            .stages
            .push((plan.stage, plan.entities, plan.frames.len()));
        if !plan.frames.is_empty() && !stage_pause.is_zero() {
            thread::sleep(stage_pause);
        }
    }
    Ok(report)
}
