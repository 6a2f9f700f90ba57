pub mod analyzer;
pub mod parser;
pub mod screenshot;
pub mod types;

pub use analyzer::ScreenAnalyzer;
pub use parser::parse_recommendation;
pub use types::RecommendationResult;
