pub mod factory;
pub mod instance;
pub mod manager;
pub mod momentum;
pub mod straddle;

pub use factory::StrategyFactory;
pub use instance::{PerformanceRecord, RiskLimits, StrategyInstance};
pub use manager::{StrategyHandle, StrategyManager};
pub use momentum::{MomentumFactory, MomentumParams, MomentumStrategy};
pub use straddle::{StraddleFactory, StraddleParams, StraddleStrategy};
