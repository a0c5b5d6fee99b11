#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: import one pending transaction
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "product,transaction,date,receipt").unwrap();
    writeln!(csv1, "coins.100,t1,2024-03-01T12:00:00Z,cmVjZWlwdA==").unwrap();

    let output1 = Command::new(cargo_bin!("receipt-verifier"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("import")
        .arg(csv1.path())
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());

    // 2. Second run: import another one against the same database
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "product,transaction,date,receipt").unwrap();
    writeln!(csv2, "coins.500,t2,2024-03-02T12:00:00Z,cmVjZWlwdA==").unwrap();

    let output2 = Command::new(cargo_bin!("receipt-verifier"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("import")
        .arg(csv2.path())
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());

    // 3. Both records survive
    let output3 = Command::new(cargo_bin!("receipt-verifier"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("list")
        .output()
        .expect("Failed to execute command");
    assert!(output3.status.success());
    let stdout = String::from_utf8_lossy(&output3.stdout);
    assert!(stdout.contains("coins.100,t1,"));
    assert!(stdout.contains("coins.500,t2,"));
}

#[test]
fn test_reconcile_keeps_unvalidated_records() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "product,transaction,date,receipt").unwrap();
    writeln!(csv, "coins.100,t1,2024-03-01T12:00:00Z,cmVjZWlwdA==").unwrap();

    let import = Command::new(cargo_bin!("receipt-verifier"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("import")
        .arg(csv.path())
        .output()
        .unwrap();
    assert!(import.status.success());

    let reconcile = Command::new(cargo_bin!("receipt-verifier"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("reconcile")
        .output()
        .unwrap();
    assert!(reconcile.status.success());
    assert!(String::from_utf8_lossy(&reconcile.stdout).contains("removed 0 of 1 records"));
}
