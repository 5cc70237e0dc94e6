use std::{env, fs};

use fleetcache_server::config::{LogBackend, loader::load_config};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("fleetcache.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 4096

[cache]
min_ttl_secs = 60
max_ttl_secs = 90

[log]
backend = "redis"
shards = 8
page_size = 50

[redis]
url = "redis://cache.internal:6379"
stream_prefix = "test:inv"
stream_max_len = 5000

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.cache.min_ttl_secs, 60);
    assert_eq!(cfg.log.backend, LogBackend::Redis);
    assert_eq!(cfg.log.shards, 8);
    assert_eq!(cfg.redis.stream_prefix, "test:inv");
    assert_eq!(cfg.redis.pool_size, 8);
    let options = cfg.redis_stream_options();
    assert_eq!(options.max_len, Some(5000));
    assert_eq!(options.shards, 8);
    assert_eq!(options.stream_prefix, "test:inv");

    // 2) Env override should win over file
    unsafe {
        env::set_var("FLEETCACHE__LOG__SHARDS", "16");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.log.shards, 16);
    unsafe {
        env::remove_var("FLEETCACHE__LOG__SHARDS");
    }

    // 3) Invalid values are rejected
    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[cache]\nmin_ttl_secs = 100\nmax_ttl_secs = 10\n").expect("write toml");
    let err = load_config(bad.to_str()).unwrap_err();
    assert!(err.contains("max_ttl_secs"));

    let bad_level = dir.path().join("bad_level.toml");
    fs::write(&bad_level, "[logging]\nlevel = \"loud\"\n").expect("write toml");
    assert!(load_config(bad_level.to_str()).is_err());
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");
    let cfg = load_config(path.to_str()).expect("defaults");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.log.backend, LogBackend::Memory);
}
