pub mod acquisition;
pub mod ai;
pub mod reader;
