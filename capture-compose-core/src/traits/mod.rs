pub mod encoder;
pub mod exporter;
pub mod media_devices;
pub mod session_events;
pub mod track_source;
