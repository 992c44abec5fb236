//! system-config: XML-driven configuration of modular motion controllers
//!
//! A system file declares slot cards, allowed-device lists, joystick mappings and per-slot
//! custom parameters (stages, flipper shutters). Loading runs the include/variable
//! preprocessor, resolves duplicate declarations, and compiles every entity into APT
//! frames up front; [`provision::configure`] then streams them to a [`apt_link::FrameSink`].

mod error;
pub use error::{ConfigError, Result};

mod node;
pub use node::ConfigNode;

mod loader;
pub use loader::{parse_xml, DocumentLoader, XmlFileLoader};

mod preprocess;
pub use preprocess::{open_xml, Preprocessor, IMPORT_SOURCE_ATTR, MAX_INCLUDE_DEPTH};

pub mod serializer;
pub use serializer::AttrKind;

pub mod resolver;
pub use resolver::{Collideable, Collision, Policy};

mod compile;
pub use compile::{Compile, Persistable};

mod settings;
pub use settings::{Card, CustomConfig, Settings};

mod allowed_devices;
pub use allowed_devices::{AllowedDevice, AllowedDevices, DeviceLock, Signature, UNRESTRICTED_SERIAL};

mod joysticks;
pub use joysticks::{Dispatcher, InMap, JoystickPort, Joysticks, OutMap, TargetControl};

mod stepper;
pub use stepper::{counts_for_distance, StageParameters, StructId};

mod shutter;
pub use shutter::{ShutterChannelConfig, ShutterParams, ShutterState, ShutterType, TriggerMode};

mod flipper;
pub use flipper::FlipperShutterGroup;

mod system;
pub use system::SystemConfig;

pub mod provision;
pub use provision::{ProvisionOptions, ProvisionReport, Stage, StagePlan};

mod metrics;
pub use metrics::{CompileMetrics, MetricsHub};
