pub mod crack;
pub mod results;
