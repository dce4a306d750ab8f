pub mod grid;
pub mod position;

pub use grid::Grid;
pub use position::Position;
