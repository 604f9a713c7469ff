pub mod feedback;
pub mod serial;
