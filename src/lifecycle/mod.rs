pub mod engine;

pub use engine::{
    Direction, LifecycleEvent, PositionLifecycleEngine, PositionState, Transaction,
};
