pub mod text;

pub use text::{contains_japanese, normalize, normalize_query, slugify};
