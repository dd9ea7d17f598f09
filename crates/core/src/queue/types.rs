use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use crate::converter::TerminateFn;

/// What a dispatched unit hands back to the queue.
///
/// Units report their own failures; the queue only learns that the future
/// settled.
pub enum Outcome {
    Plain(BoxFuture<'static, ()>),
    /// Work that can be stopped from outside through `terminate`.
    Cancellable {
        outcome: BoxFuture<'static, ()>,
        terminate: TerminateFn,
    },
}

impl Outcome {
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Cancellable { .. })
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Outcome::Plain"),
            Self::Cancellable { .. } => f.write_str("Outcome::Cancellable"),
        }
    }
}

/// A schedulable item. Called once, when a slot frees up.
pub type UnitOfWork = Box<dyn FnOnce() -> Outcome + Send + 'static>;

pub type CompletionCallback = Arc<dyn Fn() + Send + Sync + 'static>;
