pub mod score;

pub use score::score_headers;
