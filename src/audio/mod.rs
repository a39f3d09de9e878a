pub mod condition;
pub mod decode;
pub mod filter;
pub mod onset;
pub mod tempo;
