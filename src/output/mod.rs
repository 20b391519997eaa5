pub mod clean_reporter;
pub mod writer_csv;
pub mod writer_json;

pub use writer_csv::write_csv;
pub use writer_json::write_json;
