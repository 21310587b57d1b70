//! End-to-end tests: registry to transport to composed command or HTTP request.

use std::sync::Arc;

use llng_transport::{
    AnyTransport, ApiParams, FakeCommandRunner, InstanceConfig, KubernetesParams,
    ManagerOverride, Mode, RegistryConfig, Role, SessionFilter, ShellParams, SshTarget, Transport,
    TransportError, TransportRegistry,
};
use serde_json::{Map, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn shell_registry(fake: &Arc<FakeCommandRunner>) -> TransportRegistry {
    let config = RegistryConfig::single("prod", InstanceConfig::shell(ShellParams::default()));
    TransportRegistry::with_runner(config, fake.clone())
}

#[tokio::test]
async fn test_session_search_through_registry() {
    let fake = Arc::new(
        FakeCommandRunner::new().with_stdout(r#"[{"_session_id":"s1","uid":"john"}]"#),
    );
    let registry = shell_registry(&fake);
    let transport = registry.get_transport(None, Role::Portal).unwrap();

    let filter = SessionFilter::new().with_where("uid", "john");
    let result = transport.session_search(&filter).await.unwrap();

    assert_eq!(result.ids(), strings(&["s1"]));
    assert_eq!(
        fake.last_call().unwrap().argv(),
        strings(&[
            "/usr/share/lemonldap-ng/bin/lemonldap-ng-sessions",
            "search",
            "--where",
            "uid=john",
        ])
    );
}

#[tokio::test]
async fn test_unsupported_operation_spawns_nothing() {
    let fake = Arc::new(FakeCommandRunner::new());
    let registry = shell_registry(&fake);
    let transport = registry.get_transport(Some("prod"), Role::Portal).unwrap();

    let err = transport
        .second_factors_delete("dwho", &strings(&["totp1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Unsupported { .. }));
    assert!(err.to_string().contains("use API mode"));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_flag_like_session_id_spawns_nothing() {
    let fake = Arc::new(FakeCommandRunner::new());
    let registry = shell_registry(&fake);
    let transport = registry.get_transport(None, Role::Portal).unwrap();

    for ids in [strings(&["--persistent"]), strings(&["s1", ""])] {
        let err = transport
            .session_delete(&ids, &SessionFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument { .. }));
    }
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_kubernetes_pod_resolved_once() {
    let fake = Arc::new(
        FakeCommandRunner::new()
            .with_stdout("portal-abc portal-def")
            .with_stdout("Num : 7\n")
            .with_stdout("domain = example.com\n"),
    );
    let config = RegistryConfig::single(
        "k8s",
        InstanceConfig::kubernetes(KubernetesParams {
            namespace: "sso".to_string(),
            ..KubernetesParams::default()
        }),
    );
    let registry = TransportRegistry::with_runner(config, fake.clone());
    let transport = registry.get_transport(None, Role::Portal).unwrap();

    let info = transport.config_info().await.unwrap();
    let values = transport.config_get(&strings(&["domain"])).await.unwrap();
    assert_eq!(info.version, Some(7));
    assert_eq!(values["domain"], "example.com");

    let calls = fake.calls();
    assert_eq!(calls.len(), 3);
    let lookups: Vec<_> = calls
        .iter()
        .filter(|c| c.arguments().contains(&"pods".to_string()))
        .collect();
    let execs: Vec<_> = calls
        .iter()
        .filter(|c| c.arguments().contains(&"exec".to_string()))
        .collect();
    assert_eq!(lookups.len(), 1);
    assert_eq!(execs.len(), 2);
    assert!(execs.iter().all(|c| c.arguments().contains(&"portal-abc".to_string())));

    let AnyTransport::Kubernetes(k8s) = transport.as_ref() else {
        unreachable!("kubernetes instance built a {} transport", transport.mode());
    };
    assert_eq!(k8s.pod_name().await.unwrap(), "portal-abc");
    assert_eq!(fake.call_count(), 3);
}

#[tokio::test]
async fn test_ssh_wrapper_and_sudo_layering() {
    let fake = Arc::new(FakeCommandRunner::new());
    let params = ShellParams {
        wrapper: Some("docker exec sso".to_string()),
        sudo_user: Some("root".to_string()),
        remote: Some(SshTarget {
            host: "llng.example.com".to_string(),
            user: Some("deploy".to_string()),
            port: Some(2222),
            options: Vec::new(),
        }),
        ..ShellParams::default()
    };
    let config = RegistryConfig::single("remote", InstanceConfig::shell(params));
    let registry = TransportRegistry::with_runner(config, fake.clone());
    let transport = registry.get_transport(None, Role::Portal).unwrap();

    transport
        .session_delete(&strings(&["it's"]), &SessionFilter::new())
        .await
        .unwrap();

    assert_eq!(
        fake.last_call().unwrap().argv(),
        strings(&[
            "ssh",
            "-p",
            "2222",
            "deploy@llng.example.com",
            "'sudo' '-u' 'root' 'docker' 'exec' 'sso' \
             '/usr/share/lemonldap-ng/bin/lemonldap-ng-sessions' 'delete' 'it'\\''s'",
        ])
    );
}

#[tokio::test]
async fn test_api_config_set_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"cfgNum": 5, "domain": "old.com"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/config"))
        .and(wiremock::matchers::body_json(
            json!({"cfgNum": 5, "domain": "new.com", "cfgLog": "update"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let config = RegistryConfig::single("api", InstanceConfig::api(ApiParams::new(server.uri())));
    let registry = TransportRegistry::with_runner(config, Arc::new(FakeCommandRunner::new()));
    let transport = registry.get_transport(None, Role::Manager).unwrap();
    assert_eq!(transport.mode(), Mode::Api);

    let mut values = Map::new();
    values.insert("domain".to_string(), json!("new.com"));
    transport.config_set(&values, Some("update")).await.unwrap();
}

#[tokio::test]
async fn test_api_rollback_at_first_version_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cfgNum": 1})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = RegistryConfig::single("api", InstanceConfig::api(ApiParams::new(server.uri())));
    let registry = TransportRegistry::new(config);
    let transport = registry.get_transport(None, Role::Portal).unwrap();

    let err = transport.config_rollback().await.unwrap_err();
    assert!(matches!(err, TransportError::RollbackBoundary { version: 1 }));
}

#[tokio::test]
async fn test_api_rollback_restores_previous_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"cfgNum": 9, "domain": "bad.com"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"cfgNum": 8, "domain": "good.com"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/config"))
        .and(wiremock::matchers::body_json(json!({"cfgNum": 8, "domain": "good.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = RegistryConfig::single("api", InstanceConfig::api(ApiParams::new(server.uri())));
    let registry = TransportRegistry::new(config);
    registry
        .get_transport(None, Role::Portal)
        .unwrap()
        .config_rollback()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_merge_skips_forbidden_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cfgNum": 3,
            "locationRules": {"a.example.com": {"default": "accept"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/config"))
        .and(wiremock::matchers::body_json(json!({
            "cfgNum": 3,
            "locationRules": {
                "a.example.com": {"default": "accept"},
                "b.example.com": {"default": "deny"}
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = RegistryConfig::single("api", InstanceConfig::api(ApiParams::new(server.uri())));
    let registry = TransportRegistry::new(config);
    registry
        .get_transport(None, Role::Portal)
        .unwrap()
        .config_merge(&json!({
            "__proto__": {"admin": true},
            "locationRules": {"b.example.com": {"default": "deny"}}
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_manager_override_targets_api_while_portal_uses_shell() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/config/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cfgNum": 12})))
        .expect(1)
        .mount(&server)
        .await;

    let fake = Arc::new(FakeCommandRunner::new().with_stdout("Num : 12\n"));
    let instance = InstanceConfig::shell(ShellParams::default()).with_manager(ManagerOverride {
        mode: Some(Mode::Api),
        api: Some(ApiParams::new(server.uri())),
        ..ManagerOverride::default()
    });
    let registry =
        TransportRegistry::with_runner(RegistryConfig::single("prod", instance), fake.clone());

    let portal = registry.get_transport(None, Role::Portal).unwrap();
    let manager = registry.get_transport(None, Role::Manager).unwrap();
    assert_eq!(portal.config_info().await.unwrap().version, Some(12));
    assert_eq!(manager.config_info().await.unwrap().version, Some(12));
    assert_eq!(fake.call_count(), 1);

    let summary = &registry.list_instances()[0];
    assert!(summary.has_manager);
    assert_eq!(summary.mode, Mode::Shell);
}
