pub mod model;
pub mod palette;
