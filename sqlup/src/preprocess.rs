//! Text transforms applied to script contents before they are split and executed.
//!
//! The order is fixed: [`StripSchema`] (only when no schema is configured), then
//! [`VariableSubstitution`] (only when variables are enabled), then any additional
//! preprocessors in the order they were supplied. Additional preprocessors therefore always
//! see text with variables already resolved.

use crate::core::Variables;
use crate::error::Error;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// A transform from script text to script text.
pub trait ScriptPreprocessor {
    fn process(&self, contents: &str) -> Result<String, Error>;
}

impl<F> ScriptPreprocessor for F
where
    F: Fn(&str) -> Result<String, Error>,
{
    fn process(&self, contents: &str) -> Result<String, Error> {
        self(contents)
    }
}

fn schema_qualifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$schema\$\.").expect("valid schema regex"))
}

fn variable_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\w+)\$").expect("valid variable regex"))
}

/// Removes the `$schema$.` qualifier so scripts written against a schema still run when
/// none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripSchema;

impl ScriptPreprocessor for StripSchema {
    fn process(&self, contents: &str) -> Result<String, Error> {
        Ok(schema_qualifier().replace_all(contents, "").into_owned())
    }
}

/// Replaces `$name$` tokens with values from a variable set.
///
/// By default a token without a matching variable is left untouched. A strict substitution
/// reports such tokens as [`Error::Preprocess`] instead.
#[derive(Debug, Clone)]
pub struct VariableSubstitution<'v> {
    variables: &'v Variables,
    strict: bool,
}

impl<'v> VariableSubstitution<'v> {
    pub fn new(variables: &'v Variables) -> Self {
        Self {
            variables,
            strict: false,
        }
    }

    pub fn strict(variables: &'v Variables) -> Self {
        Self {
            variables,
            strict: true,
        }
    }
}

impl ScriptPreprocessor for VariableSubstitution<'_> {
    fn process(&self, contents: &str) -> Result<String, Error> {
        if self.strict {
            if let Some(missing) = variable_token()
                .captures_iter(contents)
                .map(|c| c[1].to_string())
                .find(|name| !self.variables.contains_key(name))
            {
                return Err(Error::Preprocess(format!(
                    "variable '{}' has no value defined",
                    missing
                )));
            }
        }

        let substituted = variable_token().replace_all(contents, |caps: &Captures| {
            match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        });
        Ok(substituted.into_owned())
    }
}

/// Run the fixed preprocessing sequence over `contents`.
///
/// `variables` is `None` when substitution is disabled for the run.
pub(crate) fn preprocess(
    contents: &str,
    schema_configured: bool,
    variables: Option<VariableSubstitution<'_>>,
    additional: &[Box<dyn ScriptPreprocessor>],
) -> Result<String, Error> {
    let mut contents = if schema_configured {
        contents.to_string()
    } else {
        StripSchema.process(contents)?
    };
    if let Some(substitution) = variables {
        contents = substitution.process(&contents)?;
    }
    additional
        .iter()
        .try_fold(contents, |current, preprocessor| preprocessor.process(&current))
}
