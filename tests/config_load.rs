// tests/config_load.rs
use danmaku_analyzer::config::{AppConfig, ENV_CONFIG_PATH};
use std::{env, fs};

#[test]
fn malformed_file_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("broken.toml");
    fs::write(&p, "[cache\nmax_size = ").unwrap();
    let err = AppConfig::load_from_file(&p).unwrap_err();
    assert!(format!("{err:#}").contains("parsing config"));
}

#[test]
fn shipped_sample_config_parses_to_defaults() {
    let p = concat!(env!("CARGO_MANIFEST_DIR"), "/config/danmaku.toml");
    let cfg = AppConfig::load_from_file(p).unwrap();
    assert_eq!(cfg, AppConfig::default());
}

#[serial_test::serial]
#[test]
fn default_prefers_env_then_cwd_file_then_builtins() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing on disk: built-in defaults
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.ui.time_interval_default, 60);

    // 2) ./config/danmaku.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("danmaku.toml"), "[ui]\ntime_interval_default = 45\n").unwrap();
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.ui.time_interval_default, 45);

    // 3) env path wins
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "[ui]\ntime_interval_default = 20\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.ui.time_interval_default, 20);
    env::remove_var(ENV_CONFIG_PATH);

    env::set_current_dir(&old).unwrap();
}
