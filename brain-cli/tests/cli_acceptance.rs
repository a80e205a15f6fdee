use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let root = temp_dir.path().join("brain");
        std::fs::create_dir_all(&root).expect("failed to create brain root");
        Self { _temp_dir: temp_dir, root }
    }

    fn seed_entity(&self, id: &str, entity_type: &str, name: &str, relationships: &str) {
        let path = self.root.join(format!("{id}.md"));
        std::fs::create_dir_all(path.parent().unwrap()).expect("failed to create entity dir");
        let now = "2026-01-01T00:00:00Z";
        let header = format!(
            "schema_version: 2\nid: {id}\ntype: {entity_type}\nversion: 1\ncreated: {now}\nupdated: {now}\nname: {name}\naliases: []\nstatus: active\nconfidence: 0.9\nrelationships:{relationships}\nevents: []\n"
        );
        let content = format!("---\n{header}---\nNotes on {name}.\n");
        std::fs::write(path, content).expect("failed to write entity fixture");
    }
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str]) -> Output {
    let bin_path = match bin_name {
        "brain-boot" => PathBuf::from(assert_cmd::cargo::cargo_bin!("brain-boot")),
        "brain-registry" => PathBuf::from(assert_cmd::cargo::cargo_bin!("brain-registry")),
        "brain-query" => PathBuf::from(assert_cmd::cargo::cargo_bin!("brain-query")),
        "brain-orphan" => PathBuf::from(assert_cmd::cargo::cargo_bin!("brain-orphan")),
        "brain-validate" => PathBuf::from(assert_cmd::cargo::cargo_bin!("brain-validate")),
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = Command::new(bin_path);
    command
        .args(args)
        .args(["--root"])
        .arg(&env.root)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

fn assert_success(bin_name: &str, args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "{bin_name} {args:?} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn boot_passes_on_fresh_store() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, "brain-boot", &[]);
    assert_success("brain-boot", &[], &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OK"));
}

#[test]
fn registry_rebuild_query_and_orphan_analyze_roundtrip() {
    let env = CliTestEnv::new();

    env.seed_entity(
        "entity/person/alice",
        "person",
        "Alice",
        "\n  - type: manages\n    target: entity/team/payments\n    confidence: 0.9",
    );
    env.seed_entity("entity/team/payments", "team", "Payments", " []");

    let rebuild = run_bin(&env, "brain-registry", &["rebuild", "--full"]);
    assert_success("brain-registry", &["rebuild", "--full"], &rebuild);
    let rebuild_stdout = String::from_utf8_lossy(&rebuild.stdout);
    assert!(rebuild_stdout.contains("entities"));

    let query = run_bin(&env, "brain-query", &["Alice"]);
    assert_success("brain-query", &["Alice"], &query);
    let query_stdout = String::from_utf8_lossy(&query.stdout);
    assert!(
        query_stdout.contains("entity/person/alice"),
        "expected alice in query results, got:\n{query_stdout}"
    );

    let orphan = run_bin(&env, "brain-orphan", &["analyze"]);
    assert_success("brain-orphan", &["analyze"], &orphan);
    let orphan_stdout = String::from_utf8_lossy(&orphan.stdout);
    assert!(orphan_stdout.contains("Entities scanned: 2"));
    assert!(orphan_stdout.contains("Orphans:          0"));
}

#[test]
fn validate_reports_ok_for_well_formed_entities() {
    let env = CliTestEnv::new();
    env.seed_entity("entity/person/bob", "person", "Bob", " []");

    let output = run_bin(&env, "brain-validate", &[]);
    assert_success("brain-validate", &[], &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OK"));
}
