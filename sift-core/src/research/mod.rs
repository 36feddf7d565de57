//! Research strategies and the engine that runs them.

pub mod engine;
pub mod graph;
pub mod scratchpad;
pub mod session;
pub mod strategy;

pub use engine::{AnswerOptions, ResearchEngine, ResearchEngineBuilder};
pub use graph::{GraphReaderStrategy, GraphState, Node, RationalPlan};
pub use scratchpad::{Scratchpad, ScratchpadStrategy};
pub use session::{ResearchPhase, ResearchSession};
pub use strategy::{EngineParts, Role, RoleModels, Strategy, StrategyFactory, StrategyRegistry};
