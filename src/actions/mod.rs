pub mod base;
pub(crate) mod builtin;
pub mod predicates;
pub mod registry;

pub use base::{Operation, SubmitContext};
pub use predicates::Predicate;
pub use registry::{BehaviorRegistry, BehaviorTable};
