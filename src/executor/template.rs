//! Argument templating.
//!
//! Arguments may reference variables as `$NAME` or `${NAME}`; `$$` is a
//! literal dollar sign. An argument that is exactly `$@NAME` is replaced by
//! the whole list variable `NAME`, one argument per element. Nothing is ever
//! handed to a shell, so there is no word splitting or quoting to worry about.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::build_options::{BuildSystem, BuildType};
use crate::executor::Context;
use crate::recipe::Recipe;

/// Variable names filled in from the recipe and context. `--define` cannot
/// replace them.
pub const RESERVED: &[&str] = &[
    "PREFIX",
    "BUILD_DIR",
    "SOURCE_DIR",
    "BUILD_TYPE",
    "NPROC",
    "ARCH",
    "NAME",
    "VERSION",
    "CONFIGURE_ARGS",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown variable ${name} in '{arg}'")]
    UnknownVariable { name: String, arg: String },
    #[error("unterminated ${{...}} in '{arg}'")]
    Unterminated { arg: String },
    #[error("'$' must be followed by a variable name, '{{' or '$' in '{arg}'")]
    BadReference { arg: String },
    #[error("${name} is a list; splice it as a whole argument with $@{name}")]
    ListInString { name: String },
    #[error("$@{name} must be a whole argument and name a list variable (in '{arg}')")]
    BadSplice { name: String, arg: String },
}

/// Scalar and list variables available to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    scalars: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<String>>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for installing `recipe` with `ctx`.
    ///
    /// `CONFIGURE_ARGS` exists only when the recipe has a `configure` form.
    pub fn for_recipe(recipe: &Recipe, ctx: &Context) -> Self {
        let mut vars = Self::new();
        for (key, value) in &ctx.defines {
            if !RESERVED.contains(&key.as_str()) {
                vars.set(key, value);
            }
        }

        let prefix = ctx.prefix.display().to_string();
        vars.set("PREFIX", &prefix);
        vars.set("BUILD_DIR", ctx.build_dir.display().to_string());
        vars.set("SOURCE_DIR", ctx.source_dir_for(&recipe.name).display().to_string());
        vars.set("NPROC", ctx.nproc.to_string());
        vars.set("ARCH", &ctx.arch);
        vars.set("NAME", &recipe.name);
        if let Some(version) = &recipe.version {
            vars.set("VERSION", version);
        }

        match &recipe.configuration {
            Some(config) => {
                let build_type = config.build_type();
                let native = match config.system {
                    BuildSystem::Cmake => build_type.cmake_name(),
                    BuildSystem::Meson => build_type.meson_name(),
                    BuildSystem::Autotools => build_type.keyword(),
                };
                vars.set("BUILD_TYPE", native);
                vars.set_list("CONFIGURE_ARGS", config.configure_args(&prefix));
            }
            None => vars.set("BUILD_TYPE", BuildType::default().keyword()),
        }
        vars
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.scalars.insert(name.into(), value.into());
    }

    pub fn set_list(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.lists.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scalars.get(name).map(String::as_str)
    }

    pub fn get_list(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }

    /// Expand one argument to a single string.
    pub fn expand(&self, arg: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(arg.len());
        let mut chars = arg.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }

            let name = match chars.peek().copied() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(TemplateError::Unterminated {
                                    arg: arg.to_string(),
                                });
                            }
                        }
                    }
                    if !is_name(&name) {
                        return Err(TemplateError::BadReference { arg: arg.to_string() });
                    }
                    name
                }
                Some('@') => {
                    chars.next();
                    let name: String = chars.by_ref().take_while(|c| is_name_char(*c)).collect();
                    return Err(TemplateError::BadSplice {
                        name,
                        arg: arg.to_string(),
                    });
                }
                Some(c) if is_name_start(c) => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if !is_name_char(c) {
                            break;
                        }
                        name.push(c);
                        chars.next();
                    }
                    name
                }
                _ => return Err(TemplateError::BadReference { arg: arg.to_string() }),
            };

            match self.scalars.get(&name) {
                Some(value) => out.push_str(value),
                None if self.lists.contains_key(&name) => {
                    return Err(TemplateError::ListInString { name });
                }
                None => {
                    return Err(TemplateError::UnknownVariable {
                        name,
                        arg: arg.to_string(),
                    });
                }
            }
        }

        Ok(out)
    }

    /// Expand a whole argument vector, splicing `$@NAME` arguments.
    pub fn expand_argv(&self, argv: &[String]) -> Result<Vec<String>, TemplateError> {
        let mut out = Vec::with_capacity(argv.len());
        for arg in argv {
            if let Some(name) = arg.strip_prefix("$@")
                && is_name(name)
            {
                let values = self.lists.get(name).ok_or_else(|| TemplateError::BadSplice {
                    name: name.to_string(),
                    arg: arg.clone(),
                })?;
                out.extend(values.iter().cloned());
            } else {
                out.push(self.expand(arg)?);
            }
        }
        Ok(out)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}
