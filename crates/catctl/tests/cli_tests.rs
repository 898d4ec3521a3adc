use assert_cmd::Command;
use std::path::Path;

const BATCH: &str = r#"- package: op
  name: op.v0.9.0
  version: "0.9.0"
  image: quay.io/op/op@sha256:aaaa
  channels: [alpha]
  defaultChannel: alpha
- package: op
  name: op.v0.9.2
  version: "0.9.2"
  image: quay.io/op/op@sha256:bbbb
  channels: [alpha]
  defaultChannel: alpha
  replaces: op.v0.9.0
"#;

// A fresh bundle name carrying a (package, version) pair that the
// catalog already holds.
const VERSION_DUP: &str = r#"- package: op
  name: op.v0.9.0-renamed
  version: "0.9.0"
  image: quay.io/op/op@sha256:cccc
  channels: [alpha]
  defaultChannel: alpha
"#;

fn catctl() -> Command {
    Command::cargo_bin("catctl").unwrap()
}

fn add(catalog: &Path, batch: &Path) -> assert_cmd::assert::Assert {
    catctl()
        .arg("add")
        .arg(catalog)
        .arg("--batch")
        .arg(batch)
        .assert()
}

#[test]
fn test_add_list_and_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog");
    let batch = dir.path().join("batch.yaml");
    std::fs::write(&batch, BATCH).unwrap();

    add(&catalog, &batch).success();
    assert!(catalog.join("op/catalog.json").exists());

    catctl().arg("validate").arg(&catalog).assert().success();

    let output = catctl()
        .arg("list")
        .arg(&catalog)
        .arg("packages")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("op\talpha"), "{stdout}");

    let output = catctl()
        .arg("list")
        .arg(&catalog)
        .arg("channels")
        .arg("op")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("alpha\top.v0.9.2"), "{stdout}");

    // Re-adding a bundle that is already present exits 2.
    let retry = add(&catalog, &batch);
    retry.code(2);

    // A recurring (package, version) pair exits 3.
    let dup = dir.path().join("dup.yaml");
    std::fs::write(&dup, VERSION_DUP).unwrap();
    add(&catalog, &dup).code(3);

    // Neither failed add changed the catalog.
    catctl().arg("validate").arg(&catalog).assert().success();
}

#[test]
fn test_rm_and_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog");
    let batch = dir.path().join("batch.yaml");
    std::fs::write(&batch, BATCH).unwrap();
    add(&catalog, &batch).success();

    let cache_dir = dir.path().join("cache");
    catctl()
        .arg("cache")
        .arg("build")
        .arg(&catalog)
        .arg(&cache_dir)
        .assert()
        .success();
    assert!(cache_dir.join("digest").exists());

    catctl()
        .arg("cache")
        .arg("check")
        .arg(&catalog)
        .arg(&cache_dir)
        .assert()
        .success();

    // Mutating the catalog invalidates the cache.
    catctl()
        .arg("deprecate")
        .arg(&catalog)
        .arg("op")
        .arg("op.v0.9.0")
        .assert()
        .success();
    catctl()
        .arg("cache")
        .arg("check")
        .arg(&catalog)
        .arg(&cache_dir)
        .assert()
        .failure();

    catctl().arg("rm").arg(&catalog).arg("op").assert().success();
    let output = catctl()
        .arg("list")
        .arg(&catalog)
        .arg("packages")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}
