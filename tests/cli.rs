use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("vaultstream"))
}

/// Fast Argon2 costs so tests do not grind through 64 MiB derivations.
fn seal_file(input: &Path, vault: &Path, password: &str) -> assert_cmd::assert::Assert {
    bin()
        .env("VAULTSTREAM_PASSWORD", password)
        .arg("seal")
        .arg(input)
        .arg(vault)
        .arg("--argon-mem")
        .arg("8192")
        .arg("--argon-time")
        .arg("1")
        .assert()
}

#[test]
fn seal_creates_vault_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, b"plaintext notes").unwrap();

    seal_file(&input, &vault, "pw")
        .success()
        .stdout(predicate::str::contains("sealed"));

    assert!(vault.exists());
    let sealed = fs::read(&vault).unwrap();
    assert_eq!(&sealed[..4], b"VSTR");
    let needle: &[u8] = b"plaintext notes";
    assert!(!sealed.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn seal_and_open_round_trip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    let output = dir.path().join("restored.txt");
    fs::write(&input, b"the payload survives the round trip").unwrap();

    seal_file(&input, &vault, "pw").success();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("open")
        .arg(&vault)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("opened"));

    assert_eq!(
        fs::read(&output).unwrap(),
        b"the payload survives the round trip"
    );
}

#[test]
fn wrong_password_fails() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, b"secret").unwrap();

    seal_file(&input, &vault, "correct").success();

    bin()
        .env("VAULTSTREAM_PASSWORD", "wrong")
        .arg("open")
        .arg(&vault)
        .arg(dir.path().join("out.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong password or corrupted vault"));
}

#[test]
fn corrupted_vault_fails_to_open() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, vec![0x7Eu8; 4096]).unwrap();

    seal_file(&input, &vault, "pw").success();

    // Flip a byte well inside the block stream.
    let mut sealed = fs::read(&vault).unwrap();
    let mid = sealed.len() / 2;
    sealed[mid] ^= 0x40;
    fs::write(&vault, &sealed).unwrap();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("open")
        .arg(&vault)
        .arg(dir.path().join("out.txt"))
        .assert()
        .failure();
}

#[test]
fn truncated_vault_fails_to_open() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, b"some payload").unwrap();

    seal_file(&input, &vault, "pw").success();

    let sealed = fs::read(&vault).unwrap();
    fs::write(&vault, &sealed[..sealed.len() - 20]).unwrap();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("open")
        .arg(&vault)
        .arg(dir.path().join("out.txt"))
        .assert()
        .failure();
}

#[test]
fn open_rejects_a_non_vault_file() {
    let dir = tempdir().unwrap();
    let not_vault = dir.path().join("random.bin");
    fs::write(&not_vault, vec![0xABu8; 200]).unwrap();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("open")
        .arg(&not_vault)
        .arg(dir.path().join("out.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a vaultstream file"));
}

#[test]
fn inspect_shows_header_fields_without_a_password() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, b"secret").unwrap();

    seal_file(&input, &vault, "pw").success();

    bin()
        .arg("inspect")
        .arg(&vault)
        .assert()
        .success()
        .stdout(predicate::str::contains("version:     1"))
        .stdout(predicate::str::contains("argon2id"))
        .stdout(predicate::str::contains("memory 8192 KiB"));
}

#[test]
fn seal_with_custom_argon2_parameters_round_trips() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    let output = dir.path().join("restored.txt");
    fs::write(&input, b"custom costs").unwrap();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("seal")
        .arg(&input)
        .arg(&vault)
        .arg("--argon-mem")
        .arg("16384")
        .arg("--argon-time")
        .arg("2")
        .arg("--argon-parallelism")
        .arg("2")
        .assert()
        .success();

    // The open side picks the costs up from the header.
    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("open")
        .arg(&vault)
        .arg(&output)
        .assert()
        .success();

    assert_eq!(fs::read(&output).unwrap(), b"custom costs");
}

#[test]
fn piped_stdin_supplies_the_password() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    let vault = dir.path().join("notes.vstr");
    fs::write(&input, b"piped").unwrap();

    bin()
        .env_remove("VAULTSTREAM_PASSWORD")
        .arg("seal")
        .arg(&input)
        .arg(&vault)
        .arg("--argon-mem")
        .arg("8192")
        .arg("--argon-time")
        .arg("1")
        .write_stdin("pipe-pw\n")
        .assert()
        .success();

    bin()
        .env_remove("VAULTSTREAM_PASSWORD")
        .arg("open")
        .arg(&vault)
        .arg(dir.path().join("out.txt"))
        .write_stdin("pipe-pw\n")
        .assert()
        .success();
}

#[test]
fn sealing_a_missing_input_fails() {
    let dir = tempdir().unwrap();

    bin()
        .env("VAULTSTREAM_PASSWORD", "pw")
        .arg("seal")
        .arg(dir.path().join("nope.txt"))
        .arg(dir.path().join("out.vstr"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
