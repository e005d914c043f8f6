//! Topic-exchange names, shared by every publisher and subscriber so the
//! wiring stays in one place instead of being restated as string literals
//! at each call site.

pub const MEDIA_EVENTS: &str = "media_events";
pub const AUDIO_OPS: &str = "audio_ops";
pub const AUDIO_EVENTS: &str = "audio_events";
pub const WORKER_EVENTS: &str = "worker_events";
