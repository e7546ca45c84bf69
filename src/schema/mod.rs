pub mod narrative;
pub mod score;
