pub mod frame;
pub mod report;
