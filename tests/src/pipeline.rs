use crate::harness::{eager_options, obfuscate, run_js};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tangle_analysis::collect_metrics;
use tangle_core::{parse, with_globals};
use tangle_transform::Transform;
use tangle_transform::control_flow_flattening::ControlFlowFlattening;
use tangle_transform::obfuscator::{create_report, obfuscate_source, presets};
use tangle_transform::options::ObfuscationOptions;
use tangle_transform::preparation::Preparation;
use tangle_utils::errors::ObfuscateError;

const SAMPLE: &str = r#"
function score(values) {
  var total = 0;
  for (var i = 0; i < values.length; i++) {
    if (values[i] > 0) {
      total = total + values[i];
    } else {
      total = total - 1;
    }
  }
  if (total > 10) {
    return 'high ' + total;
  }
  return 'low ' + total;
}
print(score([1, 2, 3])); print(score([5, 6, -1])); print(score([5, 6, 1]));
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tangle_transform=debug")
        .with_test_writer()
        .try_init();
}

#[test]
fn test_presets_preserve_behavior() {
    init_tracing();
    let expected = run_js(SAMPLE).unwrap();
    assert_eq!(expected, "low 6|low 10|high 12");

    let configs = [
        ("default", presets::default_obfuscation(Some(11))),
        ("light", presets::light_obfuscation(Some(11))),
        ("custom", presets::custom_obfuscation(Some(11), 1.0)),
    ];
    for (name, config) in configs {
        let result = obfuscate_source(SAMPLE, config).unwrap();
        assert!(result.targets_flattened > 0, "{name} preset flattened nothing");
        assert_eq!(run_js(&result.obfuscated_code).unwrap(), expected, "{name}");
    }
}

#[test]
fn test_minified_output_is_smaller_and_equivalent() {
    let pretty = obfuscate(SAMPLE, 3, eager_options());
    let minified = obfuscate(
        SAMPLE,
        3,
        ObfuscationOptions {
            minify: true,
            ..eager_options()
        },
    );
    assert!(minified.metadata.minified);
    assert!(minified.obfuscated_size < pretty.obfuscated_size);
    assert_eq!(
        run_js(&minified.obfuscated_code).unwrap(),
        run_js(SAMPLE).unwrap()
    );
}

#[test]
fn test_flattening_raises_potency() {
    with_globals(|| {
        let mut ir = parse(SAMPLE, "sample.js").unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        Preparation.apply(&mut ir, &mut rng).unwrap();
        let before = collect_metrics(&ir).unwrap();

        let flattening = ControlFlowFlattening::from_options(&eager_options());
        assert!(flattening.apply(&mut ir, &mut rng).unwrap());
        let after = collect_metrics(&ir).unwrap();

        assert!(after.block_cnt > before.block_cnt);
        assert!(after.edge_cnt > 0);
        assert!(after.potency > before.potency);
        assert!(after.byte_len > before.byte_len);
    });
}

#[test]
fn test_gate_can_reject_flattening() {
    let mut config = presets::default_obfuscation(Some(2));
    config.pass_config.aggressive = false;
    config.pass_config.accept_threshold = f64::MAX;
    let result = obfuscate_source(SAMPLE, config).unwrap();

    assert_eq!(result.targets_flattened, 0);
    assert_eq!(result.metadata.transforms_applied, vec!["Preparation".to_string()]);
    assert_eq!(run_js(&result.obfuscated_code).unwrap(), run_js(SAMPLE).unwrap());
}

#[test]
fn test_report_json_describes_every_target() {
    let result = obfuscate(SAMPLE, 6, eager_options());
    let report = create_report(&result);

    assert_eq!(report["seed_used"], 6);
    assert_eq!(report["targets_flattened"], result.targets_flattened);
    let targets = report["targets"].as_array().unwrap();
    assert_eq!(targets.len(), result.reports.len());
    for target in targets {
        assert!(target["blocks"].as_array().is_some_and(|b| !b.is_empty()));
        assert!(target["state_vars"].as_array().is_some_and(|s| s.len() >= 2));
    }
    let blocks: usize = result
        .reports
        .iter()
        .map(|r| r.blocks.len() - 1)
        .sum();
    assert_eq!(report["blocks_created"], blocks);
}

#[test]
fn test_errors_are_typed() {
    assert!(matches!(
        obfuscate_source("var = ;", presets::default_obfuscation(None)),
        Err(ObfuscateError::Parse(_))
    ));

    let options = ObfuscationOptions::from_json(r#"{"control_flow_flattening": -0.5}"#);
    assert!(options.is_err());
}

#[test]
fn test_unflattenable_program_passes_through() {
    let source = "function usesThis() { return this; }\nprint(typeof usesThis);";
    let result = obfuscate(source, 1, eager_options());
    assert_eq!(run_js(&result.obfuscated_code).unwrap(), "function");
    assert!(result.reports.iter().all(|r| r.target != "usesThis"));
}
