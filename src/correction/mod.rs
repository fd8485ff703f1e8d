pub mod executor;
pub mod planner;

pub use executor::AutoFixer;
pub use planner::CorrectionPlanner;
