//! Answer review and improvement cycles

mod critique;
mod pipeline;
mod reviewer;

pub use critique::{parse_critique, ReviewOutcome, MISSING_FEEDBACK_NOTICE};
pub use pipeline::{
    PipelineMetadata, PipelineOutcome, PipelineStatus, ReviewLoopRecord, ReviewPipeline,
    ReviewSummary,
};
pub use reviewer::ResponseReviewer;
