use futures::stream::{self, BoxStream};

use crate::domain::connector::QueryConnectorSpec;
use crate::domain::{ConnectorKey, RulerActionSpec, SearchRule};

/// The three entity kinds the upstream change-feed carries (spec.md §6).
#[derive(Debug, Clone)]
pub enum EntityPayload {
    QueryConnector { key: ConnectorKey, spec: QueryConnectorSpec },
    SearchRule(SearchRule),
    RulerAction(RulerActionSpec),
}

#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Create(EntityPayload),
    Update(EntityPayload),
    Delete { kind: EntityKind, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    QueryConnector,
    SearchRule,
    RulerAction,
}

/// `OnCreate | OnUpdate | OnDelete(kind, namespaced-name, spec)` — the
/// upstream change-feed contract (spec.md §6). Delivery must be
/// at-least-once; the declarative resource store and its reconciliation
/// plumbing are out of scope (spec.md §1), this crate only depends on the
/// stream shape.
pub trait ChangeFeedSource: Send + Sync {
    fn events(&self) -> BoxStream<'static, ChangeEvent>;
}

/// Reference implementation that replays a fixed event list, then ends.
/// Used by tests and a `--rules-file` static dev mode; there is no live
/// k8s API to bootstrap from in this crate's scope.
pub struct StaticChangeFeed {
    events: Vec<ChangeEvent>,
}

impl StaticChangeFeed {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }
}

impl ChangeFeedSource for StaticChangeFeed {
    fn events(&self) -> BoxStream<'static, ChangeEvent> {
        Box::pin(stream::iter(self.events.clone()))
    }
}
