pub mod actor;
pub mod bubble;
pub mod collection;

pub use actor::{BubbleActor, BubbleMessage};
pub use bubble::{Bubble, BubbleCommand, BubbleHandle, BubbleSnapshot};
pub use collection::Bubbles;
