//! Markdown plan tracking
//!
//! The plan is an ordinary file in the store (`plan.md` by default) holding
//! phases of checkbox tasks. [`Plan`] parses and writes the document;
//! [`PlanTracker`] applies task transitions to the stored copy.

mod markdown;
mod model;
mod tracker;

pub use markdown::{parse, render};
pub use model::{
    Phase, PhaseDraft, PhaseLine, Plan, PlanDraft, Progress, Section, Task, TaskState, TaskStatus,
};
pub use tracker::PlanTracker;
