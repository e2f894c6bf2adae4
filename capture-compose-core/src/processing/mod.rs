pub mod audio_mixer;
pub mod frame_compositor;
pub mod ring_buffer;
