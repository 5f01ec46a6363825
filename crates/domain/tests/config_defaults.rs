use rsa_domain::config::Config;

#[test]
fn default_host_binds_all_interfaces() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
}

#[test]
fn explicit_server_block_overrides_defaults() {
    let toml_str = r#"
[server]
host = "127.0.0.1"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3210);
}
