use assert_cmd::Command;

#[test]
fn config_subcommand_prints_effective_settings() {
    let config_dir = format!("{}/config", env!("CARGO_MANIFEST_DIR"));
    let assert = Command::cargo_bin("biblio-app")
        .unwrap()
        .arg("config")
        .env("BIBLIO_ENV", "local")
        .env("BIBLIO_CONFIG_DIR", config_dir)
        .assert()
        .success();

    let output = assert.get_output();
    let settings: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("config output should be JSON");
    assert_eq!(settings["server"]["port"], 8080);
    assert_eq!(settings["lending"]["reservation_limit"], 3);
    assert_eq!(settings["lending"]["pickup_window_days"], 5);
}

#[test]
fn unknown_subcommands_are_rejected() {
    Command::cargo_bin("biblio-app")
        .unwrap()
        .arg("definitely-not-a-command")
        .assert()
        .failure();
}
