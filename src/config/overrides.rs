//! Post-merge adjustments: `--set` overrides, map resolution and seeding

use super::{recursive_update, ConfigMap};
use crate::error::ConfigError;
use rand::Rng;
use serde_yaml::{Mapping, Value};

/// Seeds are drawn from `[1, 1e9)`.
const SEED_RANGE: std::ops::Range<u64> = 1..1_000_000_000;

/// A single `KEY=VALUE` assignment from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: Vec<String>,
    pub value: Value,
}

/// Parse `a.b.c=value`. The value side is read as YAML, so `3`, `true`,
/// `[1, 2]` and `{x: 1}` keep their types and anything else is a string.
pub fn parse_assignment(raw: &str) -> Result<Override, ConfigError> {
    let invalid = || ConfigError::InvalidOverride(raw.to_string());

    let (key, value) = raw.split_once('=').ok_or_else(invalid)?;
    let path: Vec<String> = key.trim().split('.').map(|part| part.trim().to_string()).collect();
    if path.iter().any(String::is_empty) {
        return Err(invalid());
    }

    let value = if value.trim().is_empty() {
        Value::String(String::new())
    } else {
        match serde_yaml::from_str(value) {
            // `#...` parses as a comment; only real null spellings become null.
            Ok(Value::Null) if !is_null_spelling(value) => Value::String(value.to_string()),
            Ok(parsed) => parsed,
            Err(_) => Value::String(value.to_string()),
        }
    };

    Ok(Override { path, value })
}

fn is_null_spelling(raw: &str) -> bool {
    matches!(raw.trim(), "~" | "null" | "Null" | "NULL")
}

/// Apply an override with the same semantics as a config layer.
pub fn apply_override(config: &mut ConfigMap, item: &Override) {
    let mut value = item.value.clone();
    for key in item.path.iter().rev() {
        let mut layer = Mapping::new();
        layer.insert(Value::String(key.clone()), value);
        value = Value::Mapping(layer);
    }
    if let Value::Mapping(update) = value {
        recursive_update(config, &update);
    }
}

/// Pick the map name: a non-empty `cli_map` wins and is written back into
/// `env_args.map_name`; otherwise the configured value is used.
pub fn resolve_map_name(config: &mut ConfigMap, cli_map: &str) -> Result<String, ConfigError> {
    if cli_map.is_empty() {
        return match config.get("env_args").and_then(|args| args.get("map_name")) {
            Some(Value::String(name)) => Ok(name.clone()),
            Some(Value::Null) | None => Err(ConfigError::MissingKey("env_args.map_name".into())),
            Some(_) => Err(ConfigError::WrongType {
                key: "env_args.map_name".into(),
                expected: "a string",
            }),
        };
    }

    env_args_mut(config)?.insert("map_name".into(), Value::String(cli_map.to_string()));
    Ok(cli_map.to_string())
}

/// Insert a random `seed` when the config does not pin one. Returns the
/// seed in effect.
pub fn ensure_seed<R: Rng>(config: &mut ConfigMap, rng: &mut R) -> Result<u64, ConfigError> {
    match config.get("seed") {
        Some(Value::Null) | None => {
            let seed = rng.gen_range(SEED_RANGE);
            config.insert("seed".into(), Value::from(seed));
            tracing::debug!("Generated seed {}", seed);
            Ok(seed)
        }
        Some(value) => value.as_u64().ok_or_else(|| ConfigError::WrongType {
            key: "seed".into(),
            expected: "a non-negative integer",
        }),
    }
}

/// Copy the top-level `seed` into `env_args.seed` so the environment is
/// seeded the same way as the learner.
pub fn propagate_seed(config: &mut ConfigMap) -> Result<(), ConfigError> {
    let seed = config.get("seed").cloned().ok_or_else(|| ConfigError::MissingKey("seed".into()))?;
    env_args_mut(config)?.insert("seed".into(), seed);
    Ok(())
}

fn env_args_mut(config: &mut ConfigMap) -> Result<&mut Mapping, ConfigError> {
    let slot = config.entry("env_args".into()).or_insert_with(|| Value::Mapping(Mapping::new()));
    if slot.is_null() {
        *slot = Value::Mapping(Mapping::new());
    }
    slot.as_mapping_mut()
        .ok_or_else(|| ConfigError::WrongType { key: "env_args".into(), expected: "a mapping" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn yaml(src: &str) -> Mapping {
        serde_yaml::from_str(src).expect("yaml")
    }

    #[test]
    fn empty_map_flag_uses_configured_map() {
        let mut cfg = yaml("env_args: {map_name: foo}\n");
        assert_eq!(resolve_map_name(&mut cfg, "").expect("map"), "foo");
        assert_eq!(cfg, yaml("env_args: {map_name: foo}\n"));
    }

    #[test]
    fn explicit_map_flag_overwrites_config() {
        let mut cfg = yaml("env_args: {map_name: foo, difficulty: '7'}\n");
        assert_eq!(resolve_map_name(&mut cfg, "bar").expect("map"), "bar");
        assert_eq!(cfg["env_args"]["map_name"], Value::from("bar"));
        assert_eq!(cfg["env_args"]["difficulty"], Value::from("7"));
    }

    #[test]
    fn explicit_map_flag_creates_env_args() {
        let mut cfg = Mapping::new();
        assert_eq!(resolve_map_name(&mut cfg, "2s3z").expect("map"), "2s3z");
        assert_eq!(cfg, yaml("env_args: {map_name: 2s3z}\n"));
    }

    #[test]
    fn missing_map_name_is_an_error() {
        let mut cfg = yaml("env_args: {difficulty: '7'}\n");
        let err = resolve_map_name(&mut cfg, "").expect_err("missing");
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "env_args.map_name"));
    }

    #[test]
    fn parse_assignment_keeps_yaml_types() {
        let item = parse_assignment("env_args.difficulty=7").expect("parse");
        assert_eq!(item.path, vec!["env_args", "difficulty"]);
        assert_eq!(item.value, Value::from(7));

        assert_eq!(parse_assignment("use_cuda=false").expect("parse").value, Value::from(false));
        assert_eq!(parse_assignment("name=qmix").expect("parse").value, Value::from("qmix"));
        assert_eq!(parse_assignment("label=#1").expect("parse").value, Value::from("#1"));
        assert_eq!(parse_assignment("checkpoint=~").expect("parse").value, Value::Null);
        assert_eq!(parse_assignment("checkpoint=null").expect("parse").value, Value::Null);
        assert_eq!(
            parse_assignment("layers=[64, 64]").expect("parse").value,
            Value::Sequence(vec![Value::from(64), Value::from(64)])
        );
    }

    #[test]
    fn parse_assignment_rejects_malformed_keys() {
        for raw in ["no_equals", "=1", "a..b=1", "a.=1"] {
            assert!(parse_assignment(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn apply_override_merges_nested_path() {
        let mut cfg = yaml("env_args: {map_name: 3m, difficulty: '7'}\nlr: 0.0005\n");
        apply_override(&mut cfg, &parse_assignment("env_args.map_name=5m_vs_6m").expect("parse"));
        apply_override(&mut cfg, &parse_assignment("lr=0.001").expect("parse"));
        assert_eq!(cfg, yaml("env_args: {map_name: 5m_vs_6m, difficulty: '7'}\nlr: 0.001\n"));
    }

    #[test]
    fn ensure_seed_keeps_pinned_seed() {
        let mut cfg = yaml("seed: 42\n");
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(ensure_seed(&mut cfg, &mut rng).expect("seed"), 42);
        assert_eq!(cfg["seed"], Value::from(42));
    }

    #[test]
    fn ensure_seed_fills_missing_seed_in_range() {
        let mut cfg = yaml("seed: null\n");
        let mut rng = StdRng::seed_from_u64(7);
        let seed = ensure_seed(&mut cfg, &mut rng).expect("seed");
        assert!(SEED_RANGE.contains(&seed));
        assert_eq!(cfg["seed"], Value::from(seed));
    }

    #[test]
    fn propagate_seed_copies_into_env_args() {
        let mut cfg = yaml("seed: 9\nenv_args: {map_name: 3m}\n");
        propagate_seed(&mut cfg).expect("propagate");
        assert_eq!(cfg["env_args"]["seed"], Value::from(9));
        assert_eq!(cfg["env_args"]["map_name"], Value::from("3m"));
    }
}
