pub mod alerts;
pub mod connectors;
pub mod rules;

pub use alerts::AlertPool;
pub use connectors::ConnectorRegistry;
pub use rules::RulePool;
