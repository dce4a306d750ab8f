//! Bubble Life - concurrent grid simulation of autonomous bubbles

pub mod core;
pub mod entity;
pub mod simulation;
pub mod spatial;
