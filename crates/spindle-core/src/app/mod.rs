//! App - ワイヤリングと実行
//!
//! - builder: 依存の注入と起動時検証
//! - intake: 通知 → enqueue
//! - pipeline: 起動・停止

pub mod builder;
pub mod intake;
pub mod pipeline;

pub use self::builder::{BuildError, PipelineBuilder};
pub use self::intake::{Intake, IntakeOutcome};
pub use self::pipeline::Pipeline;
