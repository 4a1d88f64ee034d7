// Resume screening: skill questions, grounded answers, scoring and analysis.

pub mod analysis;
pub mod answer_chain;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod skills;

pub use pipeline::ScreeningPipeline;
