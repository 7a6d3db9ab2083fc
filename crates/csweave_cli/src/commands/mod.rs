pub mod compile;
pub mod explain;
