//! Cross-channel budget allocation under diminishing returns.

pub mod curve;
pub mod optimizer;
pub mod types;

pub use curve::{CurveFit, SaturationCurve};
pub use optimizer::BudgetOptimizer;
pub use types::{
    AllocationStatus, BudgetAllocationRequest, BudgetAllocationResult, BudgetGoal,
    ChannelAllocation, ChannelPerformanceProfile,
};
