use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use search_ruler::domain::action::{HttpVerb, RulerActionSpec, WebhookSpec};
use search_ruler::domain::connector::QueryConnectorSpec;
use search_ruler::domain::rule::{
    ActionMode, ActionRef, CompareOp, Condition, ElasticsearchSpec, SearchRule,
};
use search_ruler::domain::ConnectorKey;
use search_ruler::pools::{AlertPool, ConnectorRegistry, RulePool};
use search_ruler::secret_store::InMemorySecretStore;
use search_ruler::services::dispatcher::Dispatcher;
use search_ruler::services::evaluator::Evaluator;
use search_ruler::services::ruleraction_registry::RulerActionRegistry;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Evaluate twice, firing, then dispatch: exercises the full
/// Evaluator -> state machine -> AlertPool -> Dispatcher -> webhook path
/// (spec.md §8 scenario 1).
#[tokio::test]
async fn firing_rule_dispatches_a_webhook() {
    let es = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "hits": {"total": {"value": 12}}
        })))
        .mount(&es)
        .await;

    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let secrets = Arc::new(InMemorySecretStore::new());
    let connectors = Arc::new(ConnectorRegistry::new(secrets.clone()));
    connectors.upsert(
        ConnectorKey::namespaced("default", "es"),
        QueryConnectorSpec {
            url: es.uri(),
            headers: Default::default(),
            tls_skip_verify: false,
            credentials_secret: None,
            certificates_secret: None,
            sync_interval_secs: 300,
        },
    );

    let actions = Arc::new(RulerActionRegistry::new(secrets));
    actions.upsert(
        "default/webhook".into(),
        RulerActionSpec {
            name: "webhook".into(),
            namespace: "default".into(),
            webhook: WebhookSpec {
                url: format!("{}/hook", webhook.uri()),
                verb: HttpVerb::Post,
                headers: Default::default(),
                tls_skip_verify: false,
                validator: None,
                credentials_secret: None,
            },
        },
    );

    let rules = Arc::new(RulePool::new());
    let alerts = Arc::new(AlertPool::new());
    let (fire_tx, mut fire_rx) = tokio::sync::mpsc::unbounded_channel();
    let evaluator = Evaluator::new(Client::new(), connectors, rules.clone(), alerts.clone(), fire_tx);

    let rule = SearchRule {
        name: "order-spike".into(),
        namespace: "default".into(),
        query_connector_ref: ConnectorKey::namespaced("default", "es"),
        check_interval_secs: 30,
        elasticsearch: ElasticsearchSpec {
            index: "orders".into(),
            condition_field: "hits.total.value".into(),
            query: Some(serde_json::json!({"query": {"match_all": {}}})),
            query_json: None,
        },
        condition: Condition {
            operator: CompareOp::GreaterThan,
            threshold: "10".into(),
            for_secs: 0,
        },
        action_ref: ActionRef {
            name: "webhook".into(),
            namespace: None,
            mode: ActionMode::Raw,
            data: Some(r#"{"orders": {{round0 value}}}"#.into()),
            labels: Default::default(),
            annotations: Default::default(),
        },
        custom_metrics: vec![],
        description: None,
    };

    evaluator.evaluate(&rule).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    evaluator.evaluate(&rule).await;

    assert!(alerts.contains(&rule.key()));

    let dispatcher = Arc::new(Dispatcher::new(Client::new(), alerts, actions, 8));
    let key = fire_rx.try_recv().expect("a fire-event was emitted");
    dispatcher.dispatch(key).await;
}
