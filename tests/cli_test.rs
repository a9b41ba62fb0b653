use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn fast_simulation() -> Command {
    let mut cmd = Command::new(cargo_bin!("settlement"));
    cmd.args([
        "--staleness-ms",
        "0",
        "--poll-interval-ms",
        "20",
        "--latency-ms",
        "0",
        "--timeout-latency-ms",
        "0",
    ]);
    cmd
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = fast_simulation();
    cmd.args(["--orders", "10"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[10] order"))
        .stdout(predicate::str::contains("\"pending\":0"));

    Ok(())
}

#[test]
fn test_cli_all_declined_orders_end_failed() {
    let mut cmd = fast_simulation();
    cmd.args([
        "--orders",
        "3",
        "--success-weight",
        "0",
        "--decline-weight",
        "1",
        "--timeout-weight",
        "0",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("FAILED: Payment declined"))
        .stdout(predicate::str::contains("-> store: PENDING"))
        .stdout(predicate::str::contains(
            r#"{"paid":0,"failed":3,"pending":0}"#,
        ));
}

#[test]
fn test_cli_phantom_charges_end_paid() {
    let mut cmd = fast_simulation();
    cmd.args([
        "--orders",
        "3",
        "--success-weight",
        "0",
        "--decline-weight",
        "0",
        "--timeout-weight",
        "1",
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("UNKNOWN: Gateway transport error"))
        .stdout(predicate::str::contains(
            r#"{"paid":3,"failed":0,"pending":0}"#,
        ));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let mut cmd = fast_simulation();
    cmd.args(["--poll-interval-ms", "0"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval must be greater than zero"));
}

#[test]
fn test_cli_reads_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        br#"{ "staleness_threshold": 0, "poll_interval": 20,
              "gateway": { "success_weight": 1, "decline_weight": 0, "timeout_weight": 0, "latency": 0 } }"#,
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("settlement"));
    cmd.arg("--config").arg(file.path()).args(["--orders", "2"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            r#"{"paid":2,"failed":0,"pending":0}"#,
        ));
}
