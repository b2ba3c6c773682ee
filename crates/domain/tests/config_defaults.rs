use kp_domain::config::{BusyPolicy, Config, ConfigSeverity, OfferPolicy};

#[test]
fn default_config_is_valid() {
    let config = Config::default();
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn empty_file_yields_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.classifier.transcript_window, 4);
    assert_eq!(config.generator.history_window, 5);
    assert_eq!(config.triage.match_risk_threshold, 5);
    assert_eq!(config.sessions.busy_policy, BusyPolicy::Queue);
    assert!(config.sessions.greeting.is_none());
    assert!(config.privacy.scrub_pii);
    assert_eq!(config.storage.state_path, "./data");
}

#[test]
fn full_file_parses() {
    let toml_str = r#"
[server]
port = 8088

[[llm.providers]]
id = "vllm"
base_url = "http://gpu-box:8000/v1"

[generator]
provider = "vllm"

[classifier]
provider = "vllm"
timeout_secs = 15

[matching]
provider = "vllm"
offer_policy = "once_per_peer"

[sessions]
busy_policy = "reject"
greeting = "Hi, I'm here to listen."
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.classifier.timeout_secs, 15);
    assert_eq!(config.matching.offer_policy, OfferPolicy::OncePerPeer);
    assert_eq!(config.sessions.busy_policy, BusyPolicy::Reject);
    assert_eq!(config.sessions.greeting.as_deref(), Some("Hi, I'm here to listen."));
    assert!(config
        .validate()
        .iter()
        .all(|e| e.severity != ConfigSeverity::Error));
}

#[test]
fn unknown_provider_is_an_error() {
    let toml_str = r#"
[generator]
provider = "missing"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.severity == ConfigSeverity::Error && e.field == "generator.provider"));
}

#[test]
fn out_of_range_threshold_is_an_error() {
    let mut config = Config::default();
    config.triage.probe_risk_threshold = 11;
    config.matching.similarity_threshold = 1.5;
    let fields: Vec<String> = config.validate().into_iter().map(|e| e.field).collect();
    assert!(fields.contains(&"triage.probe_risk_threshold".to_string()));
    assert!(fields.contains(&"matching.similarity_threshold".to_string()));
}

#[test]
fn config_error_display_is_tagged() {
    let mut config = Config::default();
    config.server.port = 0;
    let err = config
        .validate()
        .into_iter()
        .find(|e| e.field == "server.port")
        .unwrap();
    assert_eq!(err.to_string(), "[ERROR] server.port: port must be greater than 0");
}
