use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use apt_link::{commands, CommandFrame, FrameSink, MockLink, RequestResponseChannel};
use device_programming::{LutImage, LutProgrammer, OneWireProgrammer};
use system_config::provision::{self, ProvisionOptions, Stage};
use system_config::{
    counts_for_distance, FlipperShutterGroup, JoystickPort, MetricsHub, Persistable,
    StageParameters, SystemConfig,
};

mod profile;
use profile::LinkProfile;

#[derive(Parser, Debug)]
#[command(
    name = "mcm",
    version,
    about = "Configure and program modular motion controllers",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Serial,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StageArg {
    Cards,
    AllowedDevices,
    CustomConfigs,
    Joysticks,
}

impl From<StageArg> for Stage {
    fn from(s: StageArg) -> Self {
        match s {
            StageArg::Cards => Stage::Cards,
            StageArg::AllowedDevices => Stage::AllowedDevices,
            StageArg::CustomConfigs => Stage::CustomConfigs,
            StageArg::Joysticks => Stage::Joysticks,
        }
    }
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Link backend
    #[arg(long, value_enum, default_value_t = Backend::Mock)]
    backend: Backend,
    /// Serial port path (overrides the profile)
    #[arg(long)]
    port: Option<String>,
    /// YAML link profile
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Reply timeout in milliseconds (overrides the profile)
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available ports
    ListPorts {
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
    },
    /// Compile a system file and print its frames without sending them
    Compile {
        file: PathBuf,
        /// Print frames as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Leave out commit-to-storage frames
        #[arg(long, action = ArgAction::SetTrue)]
        no_persist: bool,
    },
    /// Send a system file's configuration to the controller
    Provision {
        file: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
        /// Run only these stages (default: all)
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<StageArg>,
        #[arg(long, action = ArgAction::SetTrue)]
        no_persist: bool,
        /// Pause after each stage, in milliseconds
        #[arg(long, default_value_t = 0)]
        stage_pause_ms: u64,
        /// Print frame counters in Prometheus text format when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Load stage parameters for one slot (one file, or several struct files)
    LoadStage {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Slot number, 1-based
        #[arg(long)]
        slot: u16,
        #[arg(long, action = ArgAction::SetTrue)]
        persist: bool,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Load a joystick mapping onto a host port
    LoadJoystick {
        file: PathBuf,
        /// Host port index
        #[arg(long, default_value_t = 0)]
        port_index: u8,
        #[arg(long, action = ArgAction::SetTrue)]
        persist: bool,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Load flipper/shutter parameters for one slot
    LoadFlipper {
        file: PathBuf,
        /// Slot number, 1-based
        #[arg(long)]
        slot: u16,
        #[arg(long, action = ArgAction::SetTrue)]
        persist: bool,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Encoder counts for a distance, using a stage file's encoder resolution
    Counts {
        stage: PathBuf,
        /// Distance in nanometres
        #[arg(long, allow_hyphen_values = true)]
        nm: f64,
    },
    /// Program a lookup table
    ProgramLut {
        /// Table id
        #[arg(long)]
        table: u8,
        /// Raw inquiry data
        #[arg(long)]
        inquiry: PathBuf,
        /// Raw table data, sent after the inquiry data
        #[arg(long)]
        payload: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Program the one-wire identity chip of the device in a slot
    ProgramOneWire {
        /// Slot number, 1-based
        #[arg(long)]
        slot: u8,
        /// Raw image to write
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::ListPorts { backend } => list_ports(backend),
        Commands::Compile {
            file,
            json,
            no_persist,
        } => compile(&file, json, !no_persist),
        Commands::Provision {
            file,
            link,
            only,
            no_persist,
            stage_pause_ms,
            metrics,
        } => provision_file(&file, &link, &only, !no_persist, stage_pause_ms, metrics),
        Commands::LoadStage {
            files,
            slot,
            persist,
            link,
        } => {
            let stage = match files.as_slice() {
                [one] => StageParameters::load(one, slot),
                many => StageParameters::load_segments(many, slot),
            }
            .with_context(|| format!("loading stage for slot {slot}"))?;
            send_entity(&stage, persist, &link)
        }
        Commands::LoadJoystick {
            file,
            port_index,
            persist,
            link,
        } => {
            let port = JoystickPort::load_joystick(&file, port_index)
                .with_context(|| format!("loading joystick: {}", file.display()))?;
            send_entity(&port, persist, &link)
        }
        Commands::LoadFlipper {
            file,
            slot,
            persist,
            link,
        } => {
            let group = FlipperShutterGroup::load(&file, slot)
                .with_context(|| format!("loading flipper shutters: {}", file.display()))?;
            send_entity(&group, persist, &link)
        }
        Commands::Counts { stage, nm } => counts(&stage, nm),
        Commands::ProgramLut {
            table,
            inquiry,
            payload,
            link,
        } => program_lut(table, &inquiry, &payload, &link),
        Commands::ProgramOneWire { slot, image, link } => program_one_wire(slot, &image, &link),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

type Link = Box<dyn RequestResponseChannel>;

fn open_link(args: &LinkArgs) -> Result<(Link, LinkProfile)> {
    let mut profile = LinkProfile::load_or_default(args.profile.as_deref())?;
    if let Some(port) = &args.port {
        profile.port = Some(port.clone());
    }
    if let Some(ms) = args.timeout_ms {
        profile.response_timeout_ms = ms;
    }
    let link: Link = match args.backend {
        Backend::Mock => Box::new(MockLink::new(profile.port.as_deref().unwrap_or("mock0"))),
        Backend::Serial => open_serial(&profile)?,
    };
    Ok((link, profile))
}

#[cfg(feature = "serial")]
fn open_serial(profile: &LinkProfile) -> Result<Link> {
    let path = profile
        .port
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("serial backend needs --port or a profile port"))?;
    let settings = apt_link::SerialSettings {
        baud_rate: profile.baud_rate,
        pacing: profile.pacing(),
    };
    let link = apt_link::SerialLink::open_with(path, settings)
        .with_context(|| format!("opening serial port: {path}"))?;
    Ok(Box::new(link))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_profile: &LinkProfile) -> Result<Link> {
    anyhow::bail!("serial backend not enabled; rebuild with --features serial")
}

fn list_ports(backend: Backend) -> Result<()> {
    let ports = match backend {
        Backend::Mock => MockLink::list(),
        Backend::Serial => serial_ports()?,
    };
    for p in ports {
        println!("{}\t{}", p.name, p.driver);
    }
    Ok(())
}

#[cfg(feature = "serial")]
fn serial_ports() -> Result<Vec<apt_link::PortInfo>> {
    Ok(apt_link::SerialLink::list()?)
}

#[cfg(not(feature = "serial"))]
fn serial_ports() -> Result<Vec<apt_link::PortInfo>> {
    anyhow::bail!("serial backend not enabled; rebuild with --features serial")
}

#[derive(Debug, Serialize)]
struct FrameDump {
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    destination: String,
    bytes: String,
}

impl FrameDump {
    fn new(stage: Option<Stage>, frame: &CommandFrame) -> Self {
        Self {
            stage: stage.map(Stage::name),
            command: format!("0x{:04X}", frame.command_id),
            name: commands::name(frame.command_id),
            destination: frame.destination.to_string(),
            bytes: hex(&frame.to_bytes()),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_frames(dumps: &[FrameDump]) {
    for d in dumps {
        println!(
            "{:<16} {} {:<28} -> {:<10} {}",
            d.stage.unwrap_or("-"),
            d.command,
            d.name.unwrap_or("?"),
            d.destination,
            d.bytes
        );
    }
}

fn load_system(file: &Path) -> Result<SystemConfig> {
    SystemConfig::load(file).with_context(|| format!("loading system file: {}", file.display()))
}

fn compile(file: &Path, json: bool, persist: bool) -> Result<()> {
    let system = load_system(file)?;
    let options = ProvisionOptions {
        persist,
        ..ProvisionOptions::default()
    };
    let plans = provision::plan(&system, &options)?;
    let dumps: Vec<FrameDump> = plans
        .iter()
        .flat_map(|p| p.frames.iter().map(move |f| FrameDump::new(Some(p.stage), f)))
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&dumps)?);
    } else {
        print_frames(&dumps);
        for p in &plans {
            println!(
                "# {}: {} entities, {} frames ({} persist)",
                p.stage,
                p.entities,
                p.frames.len(),
                p.persist_frames()
            );
        }
    }
    Ok(())
}

fn provision_file(
    file: &Path,
    link_args: &LinkArgs,
    only: &[StageArg],
    persist: bool,
    stage_pause_ms: u64,
    metrics: bool,
) -> Result<()> {
    let system = load_system(file)?;
    let mut options = if only.is_empty() {
        ProvisionOptions::default()
    } else {
        let stages: Vec<Stage> = only.iter().copied().map(Stage::from).collect();
        ProvisionOptions::only(&stages)
    };
    options.persist = persist;
    options.stage_pause = Duration::from_millis(stage_pause_ms);

    let (mut link, _) = open_link(link_args)?;
    let report = provision::configure(&system, &mut *link, &options)?;
    for (stage, entities, frames) in &report.stages {
        println!("{stage}: {entities} entities, {frames} frames");
    }
    println!(
        "sent {} frames ({} persist)",
        report.frames_sent, report.persist_frames_sent
    );
    if metrics {
        let hub = MetricsHub::new().map_err(anyhow::Error::msg)?;
        report.record(&hub.config);
        print!("{}", hub.encode_text());
    }
    Ok(())
}

fn send_entity<E: Persistable>(entity: &E, persist: bool, link_args: &LinkArgs) -> Result<()> {
    let frames = entity.compile_persistent(persist)?;
    let dumps: Vec<FrameDump> = frames.iter().map(|f| FrameDump::new(None, f)).collect();
    print_frames(&dumps);
    let (mut link, _) = open_link(link_args)?;
    for frame in &frames {
        link.send_frame(frame)?;
    }
    info!(frames = frames.len(), persist, "entity sent");
    println!("sent {} frames", frames.len());
    Ok(())
}

fn counts(stage_file: &Path, nm: f64) -> Result<()> {
    // slot does not affect the encoder resolution
    let stage = StageParameters::load(stage_file, 1)
        .with_context(|| format!("loading stage: {}", stage_file.display()))?;
    let nm_per_count = stage
        .nm_per_count()
        .ok_or_else(|| anyhow::anyhow!("stage has no encoder resolution"))?;
    let counts = counts_for_distance(nm, nm_per_count)
        .ok_or_else(|| anyhow::anyhow!("{nm} nm is out of range at {nm_per_count} nm/count"))?;
    println!("{counts}");
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn program_lut(table: u8, inquiry: &Path, payload: &Path, link_args: &LinkArgs) -> Result<()> {
    let inquiry = read_file(inquiry)?;
    let payload = read_file(payload)?;
    let (mut link, profile) = open_link(link_args)?;
    let mut lut = LutProgrammer::new(&mut *link).with_timeout(profile.response_timeout());
    lut.program(&LutImage {
        table,
        inquiry: &inquiry,
        payload: &payload,
    })
    .with_context(|| format!("programming lut {table}"))?;
    println!("lut {table} programmed");
    Ok(())
}

fn program_one_wire(slot: u8, image: &Path, link_args: &LinkArgs) -> Result<()> {
    let index = slot
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("slots are numbered from 1"))?;
    let image = read_file(image)?;
    let (mut link, profile) = open_link(link_args)?;
    let mut ow = OneWireProgrammer::new(&mut *link)
        .with_timeout(profile.response_timeout())
        .with_settle(profile.settle());
    let outcome = ow
        .program(index, &image)
        .with_context(|| format!("programming one-wire device in slot {slot}"))?;
    println!("{outcome}");
    Ok(())
}
