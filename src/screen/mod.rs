pub mod catalog;
pub mod state;
pub mod types;

pub use types::{
    ScreenError, ScreenResult, ScreenState, TargetSpec, Transition, TransitionAction,
};
