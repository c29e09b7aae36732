//! Send and receive session state machines.
//!
//! Both kinds run as a spawned Tokio task that owns its capability (renderer
//! or scanner) and watches one [`AbortSignal`](crate::AbortSignal). The
//! handle returned to the caller observes the task through watch channels.

mod accumulator;
pub mod receive;
pub mod send;

#[cfg(test)]
mod tests;

pub use accumulator::{FrameAccumulator, Insert};
pub use receive::{
    ReceiveOptions, ReceiveProgress, ReceiveSession, ReceiveState, ReceivedData, ReceivedFrame,
};
pub use send::{RenderedFrame, SendOptions, SendSession, SendState};

/// Progress hook invoked from the session task.
pub(crate) type Callback<T> = Box<dyn FnMut(&T) + Send>;
