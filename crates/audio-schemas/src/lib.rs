pub mod base;
pub mod commands;
pub mod events;
pub mod exchanges;
pub mod job;
pub mod metadata;

pub use base::{SpeakerTurn, TranscriptWord};
pub use exchanges::{AUDIO_EVENTS, AUDIO_OPS, MEDIA_EVENTS, WORKER_EVENTS};
pub use commands::{
    CancelCommand, DiarizeCommand, EnhanceCommand, LanguageDetectCommand, PostProcessCommand,
    PreprocessCommand, RecognizeCommand, SegmentCommand, TranscodeCommand,
};
pub use events::{
    DiarizationCompletedEvent, EnhancementCompletedEvent, FileUploadedEvent,
    JobCancelledEvent, JobFailedEvent, JobFinalizedEvent, LanguageDetectionCompletedEvent,
    PreprocessCompletedEvent, RecognitionCompletedEvent, SegmentCompletedEvent,
    SegmentDescriptor, TranscodeCompletedEvent,
};
pub use job::{JobRecord, JobStatus, ProgressFrame, SegmentRecord, StepKey};
pub use metadata::{Assets, FinalMetadata, ResultsBlock};
