pub mod header;
pub mod naming;
pub mod plan;
