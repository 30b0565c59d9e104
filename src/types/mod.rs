pub mod catalog;
pub mod region;
pub mod sample;
pub mod time;
