use optionsbot_core::{Strategy, TradingMode};

/// Builds strategy objects for a registered class name.
///
/// A factory captures its collaborators (price gateway, clocks) at
/// construction, so `create` hands back a fully wired strategy.
pub trait StrategyFactory: Send + Sync {
    fn class_name(&self) -> &str;

    /// Trading modes instances of this class may run under.
    fn supported_modes(&self) -> &[TradingMode];

    /// # Errors
    /// Returns an error if `parameters` are malformed for this class.
    fn create(
        &self,
        name: &str,
        parameters: &serde_json::Value,
    ) -> anyhow::Result<Box<dyn Strategy>>;
}
