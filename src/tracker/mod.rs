pub mod binding;
pub mod movement;
pub mod rolling;

pub use binding::{Binding, BindingPolicy, Role, RoleBindings, TrackBinder};
pub use movement::{
    AnglePredicate, MovementEvent, MovementState, MovementStateMachine, ThresholdDirection,
    ThresholdPredicate,
};
pub use rolling::{AngleSample, RollingSeriesBuffer, SeriesSnapshot};
