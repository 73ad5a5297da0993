//! Command-line behavior that does not need a broker

use assert_cmd::Command;
use predicates::prelude::*;

fn warren(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("warren").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("WARREN_URL")
        .env_remove("WARREN_VHOST")
        .env_remove("WARREN_EXCHANGE")
        .env_remove("WARREN_QUEUE")
        .env_remove("WARREN_POOL_SIZE");
    cmd
}

#[test]
fn test_config_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    warren(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"micronaut\""))
        .stdout(predicate::str::contains("name = \"analytics\""))
        .stdout(predicate::str::contains("amqp://localhost:5672"));
}

#[test]
fn test_config_reads_default_file_and_env() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("warren.toml"),
        "[topology.exchange]\nname = \"books\"\nkind = \"topic\"\n",
    )
    .unwrap();

    warren(&dir)
        .env("WARREN_QUEUE", "inventory")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"books\""))
        .stdout(predicate::str::contains("kind = \"topic\""))
        .stdout(predicate::str::contains("name = \"inventory\""));
}

#[test]
fn test_flag_beats_environment() {
    let dir = tempfile::tempdir().unwrap();
    warren(&dir)
        .env("WARREN_EXCHANGE", "from-env")
        .args(["config", "--exchange", "from-flag"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-flag"))
        .stdout(predicate::str::contains("from-env").not());
}

#[test]
fn test_reserved_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    warren(&dir)
        .args(["config", "--queue", "amq.gen-1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("reserved prefix"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    warren(&dir)
        .args(["config", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}

#[test]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
fn test_declare_and_publish() {
    let dir = tempfile::tempdir().unwrap();
    warren(&dir).arg("declare").assert().success();
    warren(&dir)
        .args(["publish", "{\"isbn\":\"1491950358\"}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published"));
}
