//! Table options → source descriptor.
//!
//! A scripted table names its row producer either by script file
//! (`wrapper_path`) or by a class already registered in the runtime
//! (`wrapper_class`). Every other foreign-table option is handed to the
//! wrapper's constructor as a string parameter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use crate::error::ConfigError;

pub const WRAPPER_PATH: &str = "wrapper_path";
pub const WRAPPER_CLASS: &str = "wrapper_class";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionContext {
    ForeignTable,
    Server,
    Wrapper,
    UserMapping,
}

impl std::fmt::Display for OptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OptionContext::ForeignTable => "foreign table",
            OptionContext::Server => "server",
            OptionContext::Wrapper => "foreign-data wrapper",
            OptionContext::UserMapping => "user mapping",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub context: OptionContext,
}

pub static VALID_OPTIONS: &[OptionSpec] = &[
    OptionSpec { name: WRAPPER_PATH, context: OptionContext::ForeignTable },
    OptionSpec { name: WRAPPER_CLASS, context: OptionContext::ForeignTable },
];

pub fn is_valid_option(name: &str, context: OptionContext) -> bool {
    VALID_OPTIONS.iter().any(|o| o.context == context && o.name == name)
}

fn hint_for(context: OptionContext) -> String {
    let names: Vec<&str> = VALID_OPTIONS.iter().filter(|o| o.context == context).map(|o| o.name).collect();
    if names.is_empty() {
        format!("there are no valid options in this context ({})", context)
    } else {
        format!("valid options in this context are: {}", names.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    InlineScript(PathBuf),
    RegisteredType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub mode: SourceMode,
    /// Options forwarded to the wrapper constructor.
    pub parameters: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn inline(path: impl Into<PathBuf>) -> Self {
        Self { mode: SourceMode::InlineScript(path.into()), parameters: BTreeMap::new() }
    }

    pub fn registered(name: impl Into<String>) -> Self {
        Self { mode: SourceMode::RegisteredType(name.into()), parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Short label for logs and errors, e.g. `script /srv/a.lua`.
    pub fn label(&self) -> String {
        match &self.mode {
            SourceMode::InlineScript(p) => format!("script {}", p.display()),
            SourceMode::RegisteredType(n) => format!("class {}", n),
        }
    }
}

/// Check an option list for `context`. Options are (key, value) pairs in the
/// order the user gave them.
pub fn validate(context: OptionContext, options: &[(String, String)], strict: bool) -> Result<(), ConfigError> {
    let mut seen_path = false;
    let mut seen_class = false;

    for (name, value) in options {
        if !is_valid_option(name, context) {
            let hint = hint_for(context);
            if strict || context != OptionContext::ForeignTable {
                return Err(ConfigError::UnknownOption { name: name.clone(), hint });
            }
            info!(target: "scriptscan::config", "option \"{}\" is not a scan option; passing it to the wrapper ({})", name, hint);
            continue;
        }
        let seen = if name == WRAPPER_PATH { &mut seen_path } else { &mut seen_class };
        if *seen {
            return Err(ConfigError::DuplicateOption(name.clone()));
        }
        *seen = true;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(name.clone()));
        }
    }

    if seen_path && seen_class {
        return Err(ConfigError::ConflictingSource);
    }
    if context == OptionContext::ForeignTable && !seen_path && !seen_class {
        return Err(ConfigError::MissingSource);
    }
    Ok(())
}

/// Validate foreign-table options and build the descriptor.
pub fn resolve(options: &[(String, String)], strict: bool) -> Result<SourceDescriptor, ConfigError> {
    validate(OptionContext::ForeignTable, options, strict)?;

    let mut mode = None;
    let mut parameters = BTreeMap::new();
    for (name, value) in options {
        match name.as_str() {
            WRAPPER_PATH => mode = Some(SourceMode::InlineScript(PathBuf::from(value))),
            WRAPPER_CLASS => mode = Some(SourceMode::RegisteredType(value.clone())),
            _ => {
                parameters.insert(name.clone(), value.clone());
            }
        }
    }
    let mode = mode.ok_or(ConfigError::MissingSource)?;
    Ok(SourceDescriptor { mode, parameters })
}
