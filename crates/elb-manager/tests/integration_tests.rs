/// Integration tests for the load balancer manager
/// These drive the manager end-to-end against the in-memory provider

use elb_manager::{
    InMemoryLoadBalancerService, ListenerSpec, LoadBalancerManager, LoadBalancerName,
    ManagerError, Presence, Protocol, ServiceCall, ServiceError, Visibility,
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn setup() -> (Arc<InMemoryLoadBalancerService>, LoadBalancerManager) {
    let service = Arc::new(InMemoryLoadBalancerService::new("us-east-1"));
    let manager = LoadBalancerManager::new(service.clone());
    (service, manager)
}

fn subnets() -> Vec<String> {
    vec!["subnet-a".to_string(), "subnet-b".to_string()]
}

fn members(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

async fn membership(manager: &LoadBalancerManager, name: &str) -> BTreeSet<String> {
    manager
        .instances(name)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn test_provision_then_exists_returns_same_dns_name() {
    let (_service, manager) = setup();

    let dns_name = manager.provision("api-lb", &subnets(), 6443).await.unwrap();
    assert!(!dns_name.is_empty());

    let presence = manager.exists("api-lb").await.unwrap();
    assert!(presence.is_found());
    assert_eq!(presence.dns_name(), dns_name);
    assert_eq!(
        manager.visibility("api-lb").await.unwrap(),
        Visibility::Public
    );
}

#[tokio::test]
async fn test_health_check_failure_leaves_load_balancer_discoverable() {
    let (service, manager) = setup();
    service.fail_next(
        ServiceCall::ConfigureHealthCheck,
        ServiceError::new("InternalFailure", "health check backend unavailable"),
    );

    let err = manager
        .provision("api-lb", &subnets(), 6443)
        .await
        .unwrap_err();

    let dns_name = match &err {
        ManagerError::HealthCheck {
            name,
            dns_name,
            source,
        } => {
            assert_eq!(name, "api-lb");
            assert_eq!(source.code, "InternalFailure");
            dns_name.clone()
        }
        other => panic!("expected HealthCheck error, got {:?}", other),
    };
    assert!(err.is_retryable());

    // partial completion is observable
    let presence = manager.exists("api-lb").await.unwrap();
    assert_eq!(presence, Presence::Found { dns_name });
    let description = manager.describe("api-lb").await.unwrap().unwrap();
    assert!(description.health_check.is_none());

    // and the health check step can be retried on its own
    manager.restore_health_check("api-lb").await.unwrap();
    let description = manager.describe("api-lb").await.unwrap().unwrap();
    assert_eq!(
        description.health_check.unwrap().target(),
        "HTTP:6443/"
    );
}

#[tokio::test]
async fn test_exists_on_unknown_name_is_absent_not_error() {
    let (_service, manager) = setup();

    let presence = manager.exists("never-created").await.unwrap();
    assert_eq!(presence, Presence::Absent);
    assert!(!presence.is_found());
    assert_eq!(presence.dns_name(), "");
}

#[tokio::test]
async fn test_exists_propagates_other_faults() {
    let (service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    service.fail_next(
        ServiceCall::DescribeLoadBalancer,
        ServiceError::new("Throttling", "Rate exceeded"),
    );

    let err = manager.exists("api-lb").await.unwrap_err();
    match err {
        ManagerError::Remote(fault) => {
            assert_eq!(fault.code, "Throttling");
            assert_eq!(fault.message, "Rate exceeded");
        }
        other => panic!("expected Remote error, got {:?}", other),
    }

    // the fault was transient; the next lookup succeeds
    assert!(manager.exists("api-lb").await.unwrap().is_found());
}

#[tokio::test]
async fn test_exists_after_external_deletion() {
    let (service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    assert!(service.remove(&LoadBalancerName::new("api-lb").unwrap()));
    assert_eq!(manager.exists("api-lb").await.unwrap(), Presence::Absent);
}

#[tokio::test]
async fn test_set_private_twice_succeeds() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    manager.set_private("api-lb").await.unwrap();
    assert_eq!(
        manager.visibility("api-lb").await.unwrap(),
        Visibility::Private
    );

    manager.set_private("api-lb").await.unwrap();
    assert_eq!(
        manager.visibility("api-lb").await.unwrap(),
        Visibility::Private
    );
}

#[tokio::test]
async fn test_public_private_toggle() {
    let (_service, manager) = setup();
    let dns_name = manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    manager.set_public("api-lb", 6443).await.unwrap();
    manager.set_private("api-lb").await.unwrap();

    let presence = manager.exists("api-lb").await.unwrap();
    assert_eq!(presence.dns_name(), dns_name);

    let description = manager.describe("api-lb").await.unwrap().unwrap();
    assert!(description.listener(6443).is_none());

    manager.set_public("api-lb", 6443).await.unwrap();
    assert_eq!(
        manager.visibility("api-lb").await.unwrap(),
        Visibility::Public
    );
}

#[tokio::test]
async fn test_identical_listener_twice_then_conflict() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();
    manager.set_private("api-lb").await.unwrap();

    let listener = ListenerSpec::new(6443, 6443, Protocol::Tcp).unwrap();
    manager.add_listener("api-lb", listener).await.unwrap();
    manager.add_listener("api-lb", listener).await.unwrap();

    let conflicting = ListenerSpec::new(6443, 8080, Protocol::Tcp).unwrap();
    let err = manager
        .add_listener("api-lb", conflicting)
        .await
        .unwrap_err();

    match &err {
        ManagerError::ListenerConflict {
            existing,
            requested,
            ..
        } => {
            assert_eq!(*existing, listener);
            assert_eq!(*requested, conflicting);
        }
        other => panic!("expected ListenerConflict, got {:?}", other),
    }
    assert!(!err.is_retryable());

    // the original listener is untouched
    let description = manager.describe("api-lb").await.unwrap().unwrap();
    assert_eq!(description.listeners, vec![listener]);
}

#[tokio::test]
async fn test_set_public_when_already_public() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    manager.set_public("api-lb", 6443).await.unwrap();

    let conflicting = ListenerSpec::new(6443, 6443, Protocol::Ssl).unwrap();
    assert!(matches!(
        manager.add_listener("api-lb", conflicting).await,
        Err(ManagerError::ListenerConflict { .. })
    ));
}

#[tokio::test]
async fn test_add_instances_is_idempotent() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    manager
        .add_instances("api-lb", ["i-1", "i-2", "i-3"])
        .await
        .unwrap();
    let once = membership(&manager, "api-lb").await;

    manager
        .add_instances("api-lb", ["i-1", "i-2", "i-3"])
        .await
        .unwrap();
    let twice = membership(&manager, "api-lb").await;

    assert_eq!(once, twice);
    assert_eq!(twice, members(&["i-1", "i-2", "i-3"]));
}

#[tokio::test]
async fn test_remove_non_member_leaves_membership_unchanged() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();
    manager.add_instances("api-lb", ["i-1", "i-2"]).await.unwrap();

    manager.remove_instances("api-lb", ["i-9"]).await.unwrap();
    assert_eq!(
        membership(&manager, "api-lb").await,
        members(&["i-1", "i-2"])
    );

    // a mix of members and strays removes the members
    manager
        .remove_instances("api-lb", ["i-1", "i-9"])
        .await
        .unwrap();
    assert_eq!(membership(&manager, "api-lb").await, members(&["i-2"]));
}

#[tokio::test]
async fn test_membership_independent_of_visibility() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();
    manager.add_instances("api-lb", ["i-1"]).await.unwrap();

    manager.set_private("api-lb").await.unwrap();
    assert_eq!(membership(&manager, "api-lb").await, members(&["i-1"]));

    manager.add_instances("api-lb", ["i-2"]).await.unwrap();
    manager.set_public("api-lb", 6443).await.unwrap();
    assert_eq!(
        membership(&manager, "api-lb").await,
        members(&["i-1", "i-2"])
    );
}

#[tokio::test]
async fn test_node_replacement_sequence() {
    let (service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();
    manager
        .add_instances("api-lb", ["i-old", "i-2"])
        .await
        .unwrap();
    service.clear_calls();

    manager.remove_instances("api-lb", ["i-old"]).await.unwrap();
    manager.add_instances("api-lb", ["i-new"]).await.unwrap();

    assert_eq!(
        service.calls(),
        vec![
            ServiceCall::DeregisterInstances,
            ServiceCall::RegisterInstances
        ]
    );
    assert_eq!(
        membership(&manager, "api-lb").await,
        members(&["i-2", "i-new"])
    );
}

#[tokio::test]
async fn test_reprovision_with_different_port_is_rejected() {
    let (_service, manager) = setup();
    manager.provision("api-lb", &subnets(), 6443).await.unwrap();

    let err = manager
        .provision("api-lb", &subnets(), 443)
        .await
        .unwrap_err();
    match err {
        ManagerError::Provision { source, .. } => {
            assert_eq!(source.code, "DuplicateLoadBalancerName")
        }
        other => panic!("expected Provision error, got {:?}", other),
    }
}
