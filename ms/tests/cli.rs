use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ms(store: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ms").unwrap();
    cmd.arg("--store").arg(store.path());
    cmd
}

#[test]
fn test_upsert_then_query() {
    let store = TempDir::new().unwrap();

    ms(&store)
        .args(["upsert", "t1:m1", "three days camping in big sur", "-m", "thread_id=t1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upserted"));

    ms(&store)
        .args(["query", "big sur camping", "--where", "thread_id=t1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("t1:m1"));

    ms(&store)
        .args(["query", "big sur camping", "--where", "thread_id=t2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches"));
}

#[test]
fn test_seed_and_stats() {
    let store = TempDir::new().unwrap();
    let seed = store.path().join("seed.json");
    std::fs::write(
        &seed,
        r#"{"docs": [{"doc_id": "a", "text": "Fire rules apply."}, {"doc_id": "b", "text": "Bring water."}]}"#,
    )
    .unwrap();

    ms(&store)
        .arg("seed")
        .arg(&seed)
        .assert()
        .success()
        .stdout(predicate::str::contains("Seeded 2"));

    ms(&store)
        .args(["stats", "travel_docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Records: 2"));

    ms(&store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("travel_docs"));
}

#[test]
fn test_delete_where_requires_valid_filter() {
    let store = TempDir::new().unwrap();
    ms(&store).args(["delete-where", "no-equals-sign"]).assert().failure();
}
