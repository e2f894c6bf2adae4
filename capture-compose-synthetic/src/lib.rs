//! # capture-compose-synthetic
//!
//! Software backend for capture-compose. Everything a platform would supply
//! is generated in-process, so the engine can be driven end to end on any
//! machine, in CI, or from the `synthetic-record` command.
//!
//! Provides:
//! - `SyntheticDevices`: display and camera test patterns with sine-tone
//!   display audio and microphone, gated by simulated permission prompts
//! - `FrameEncoder`: incremental encoder writing the
//!   `application/x-capture-frames` container
//! - `FileExporter`: writes artifacts plus a JSON metadata sidecar
//! - `DeviceEnumerator`: lists the synthetic devices a profile exposes
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use capture_compose_core::{CaptureConfig, CaptureEngine, EngineOptions, NoopEvents};
//! use capture_compose_synthetic::{FrameEncoder, SyntheticDevices, CONTAINER_MIME};
//!
//! let options = EngineOptions { mime_type: CONTAINER_MIME.into(), ..Default::default() };
//! let engine = CaptureEngine::new(
//!     Arc::new(SyntheticDevices::default()),
//!     Arc::new(FrameEncoder::new()),
//!     options,
//! )?;
//! let session = engine.create_session(CaptureConfig::default(), Arc::new(NoopEvents))?;
//! session.start()?;
//! ```

pub mod container;
pub mod device_enumerator;
pub mod devices;
pub mod encoder;
pub mod exporter;
pub mod pattern;
pub mod permissions;
pub mod tone;

pub use container::{summarize, ContainerSummary, CONTAINER_MIME};
pub use device_enumerator::{DeviceEnumerator, DeviceInfo, DeviceKind};
pub use devices::{DeviceProfile, SyntheticDevices};
pub use encoder::FrameEncoder;
pub use exporter::FileExporter;
pub use pattern::TestPatternSource;
pub use permissions::{PermissionState, Permissions};
pub use tone::ToneSource;
