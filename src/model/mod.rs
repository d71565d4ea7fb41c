//! Musical vocabulary shared by the analysis and report layers

mod pitch;

pub use pitch::PitchClass;
