use serde_json::Value;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const SOURCE: &str = r#"
function clamp(x, lo, hi) {
  var r = x;
  if (r < lo) { r = lo; } else { r = r; }
  if (r > hi) { r = hi; }
  return r;
}
console.log(clamp(12, 0, 10));
"#;

fn tangle() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tangle"))
}

#[test]
fn obfuscate_writes_code_and_report() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in.js");
    let output = tmp.path().join("out.js");
    let report = tmp.path().join("report.json");
    fs::write(&input, SOURCE).unwrap();

    let status = tangle()
        .args(["obfuscate", &format!("@{}", input.display()), "--seed", "7"])
        .args(["--output", output.to_str().unwrap()])
        .args(["--emit", report.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(status.success());

    let code = fs::read_to_string(&output).unwrap();
    assert!(code.contains("switch"), "output: {code}");
    let report: Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert!(report["targets_flattened"].as_u64().unwrap() >= 1);
    assert_eq!(report["seed_used"], 7);
}

#[test]
fn same_seed_is_deterministic() {
    let run = || {
        tangle()
            .args(["obfuscate", SOURCE, "--seed", "11", "--minify"])
            .output()
            .unwrap()
    };
    let (a, b) = (run(), run());
    assert!(a.status.success());
    assert_eq!(a.stdout, b.stdout);
}

#[test]
fn cfg_prints_dot() {
    let out = tangle().args(["cfg", SOURCE]).output().unwrap();
    assert!(out.status.success());
    let dot = String::from_utf8(out.stdout).unwrap();
    assert!(dot.starts_with("digraph"), "stdout: {dot}");
    assert!(dot.contains("doublecircle"), "the end block is drawn");
}

#[test]
fn invalid_options_file_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("options.json");
    fs::write(&config, r#"{"control_flow_flattening": 1.5}"#).unwrap();

    let status = tangle()
        .args(["obfuscate", SOURCE, "--config", config.to_str().unwrap()])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn syntax_error_fails() {
    let out = tangle().args(["obfuscate", "var = ;"]).output().unwrap();
    assert!(!out.status.success());
    assert!(!out.stderr.is_empty(), "the parse error is reported");
}
