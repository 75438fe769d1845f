use std::path::PathBuf;

use crate::config::{resolve, validate, OptionContext, SourceMode, VALID_OPTIONS, WRAPPER_CLASS, WRAPPER_PATH};
use crate::error::ConfigError;

fn opts(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn option_table_is_foreign_table_only() {
    assert_eq!(VALID_OPTIONS.len(), 2);
    for spec in VALID_OPTIONS {
        assert_eq!(spec.context, OptionContext::ForeignTable);
        assert!([WRAPPER_PATH, WRAPPER_CLASS].contains(&spec.name));
    }
    for ctx in [OptionContext::Server, OptionContext::Wrapper, OptionContext::UserMapping] {
        validate(ctx, &[], false).unwrap();
        let err = validate(ctx, &opts(&[(WRAPPER_PATH, "/a.lua")]), false).unwrap_err();
        match err {
            ConfigError::UnknownOption { name, hint } => {
                assert_eq!(name, WRAPPER_PATH);
                assert!(hint.contains("no valid options"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn path_mode_forwards_extra_options() {
    let d = resolve(&opts(&[("wrapper_path", "/srv/w.lua"), ("host", "10.0.0.1"), ("port", "6379")]), false).unwrap();
    assert_eq!(d.mode, SourceMode::InlineScript(PathBuf::from("/srv/w.lua")));
    assert_eq!(d.parameters.len(), 2);
    assert_eq!(d.parameters.get("host").map(String::as_str), Some("10.0.0.1"));
}

#[test]
fn class_mode() {
    let d = resolve(&opts(&[("wrapper_class", "Builtin.Series")]), false).unwrap();
    assert_eq!(d.mode, SourceMode::RegisteredType("Builtin.Series".into()));
    assert!(d.parameters.is_empty());
    assert_eq!(d.label(), "class Builtin.Series");
}

#[test]
fn exactly_one_source() {
    assert_eq!(resolve(&opts(&[("host", "x")]), false), Err(ConfigError::MissingSource));
    assert_eq!(
        resolve(&opts(&[("wrapper_path", "/a.lua"), ("wrapper_class", "A")]), false),
        Err(ConfigError::ConflictingSource)
    );
    assert_eq!(
        resolve(&opts(&[("wrapper_path", "/a.lua"), ("wrapper_path", "/b.lua")]), false),
        Err(ConfigError::DuplicateOption("wrapper_path".into()))
    );
    assert_eq!(resolve(&opts(&[("wrapper_class", "  ")]), false), Err(ConfigError::EmptyValue("wrapper_class".into())));
}

#[test]
fn strict_mode_rejects_unknown_keys() {
    let err = resolve(&opts(&[("wrapper_path", "/a.lua"), ("colour", "red")]), true).unwrap_err();
    match err {
        ConfigError::UnknownOption { name, hint } => {
            assert_eq!(name, "colour");
            assert!(hint.contains("wrapper_path"));
            assert!(hint.contains("wrapper_class"));
        }
        other => panic!("unexpected {:?}", other),
    }
}
