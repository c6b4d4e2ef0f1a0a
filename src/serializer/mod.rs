//! Row post-processing between the warehouse and the HTTP response.

pub mod json_relaxed;
pub mod materializer;

pub use json_relaxed::relaxed_json_parse;
pub use materializer::ResultMaterializer;
