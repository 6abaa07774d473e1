use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_point_at_local_development_server() {
    let settings = ClientSettings::default();
    assert_eq!(settings.server_url, "http://localhost:3000");
    assert_eq!(settings.page_size, 10);
    assert_eq!(settings.retry, RetryPolicy::Fixed(Duration::from_millis(5000)));
    assert_eq!(settings.delete_error_ttl, Duration::from_millis(5000));
}

#[test]
fn push_url_follows_transport_security() {
    let mut settings = ClientSettings {
        server_url: "http://calls.internal:8080".into(),
        ..ClientSettings::default()
    };
    assert_eq!(
        settings.push_url().expect("push url").as_str(),
        "ws://calls.internal:8080/ws"
    );

    settings.server_url = "https://calls.example.com".into();
    assert_eq!(
        settings.push_url().expect("push url").as_str(),
        "wss://calls.example.com/ws"
    );
}

#[test]
fn endpoints_keep_path_prefix() {
    let settings = ClientSettings {
        server_url: "https://example.com/dashboard".into(),
        ..ClientSettings::default()
    };
    let endpoints = settings.endpoints().expect("endpoints");
    assert_eq!(
        endpoints.calls.as_str(),
        "https://example.com/dashboard/api/calls"
    );
    assert_eq!(endpoints.push.as_str(), "wss://example.com/dashboard/ws");
}

#[test]
fn rejects_non_http_server_url() {
    let settings = ClientSettings {
        server_url: "ftp://example.com".into(),
        ..ClientSettings::default()
    };
    assert!(settings.endpoints().is_err());

    let settings = ClientSettings {
        server_url: "not a url".into(),
        ..ClientSettings::default()
    };
    assert!(settings.push_url().is_err());
}

#[test]
fn overrides_replace_parsable_values_only() {
    let mut settings = ClientSettings::default();
    apply_overrides(
        &mut settings,
        lookup_from(&[
            ("server_url", "https://calls.example.com"),
            ("page_size", "25"),
            ("retry_delay_ms", "not-a-number"),
            ("delete_error_ttl_ms", "1500"),
        ]),
    );

    assert_eq!(settings.server_url, "https://calls.example.com");
    assert_eq!(settings.page_size, 25);
    assert_eq!(settings.retry, RetryPolicy::Fixed(DEFAULT_RETRY_DELAY));
    assert_eq!(settings.delete_error_ttl, Duration::from_millis(1500));
}

#[test]
fn zero_page_size_is_ignored() {
    let mut settings = ClientSettings::default();
    apply_overrides(&mut settings, lookup_from(&[("page_size", "0")]));
    assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
}

#[test]
fn settings_file_accepts_strings_and_integers() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("calls_client_settings_{suffix}.toml"));
    fs::write(
        &path,
        "server_url = \"http://10.0.0.5:4000\"\npage_size = 20\nverbose = true\n",
    )
    .expect("write settings");

    let file_cfg = read_settings_file(&path).expect("parsed");
    assert_eq!(file_cfg.get("server_url").map(String::as_str), Some("http://10.0.0.5:4000"));
    assert_eq!(file_cfg.get("page_size").map(String::as_str), Some("20"));
    assert!(!file_cfg.contains_key("verbose"));

    fs::remove_file(path).expect("cleanup");
}
