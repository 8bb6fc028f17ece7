//! Bundle rendering with MiniJinja
//!
//! Templates see three globals: `values`, `release` and `bundle`. Templates
//! whose file name starts with `_` are helpers: they can be imported by other
//! templates but produce no output of their own.

use base64::Engine as _;
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use tether_core::{LoadedBundle, TemplateContext};

use crate::error::Result;

/// Render every template of the bundle into one multi-document manifest
pub fn render_bundle(bundle: &LoadedBundle, context: &TemplateContext) -> Result<String> {
    render_templates(&bundle.templates()?, context)
}

/// Render `(name, source)` templates into one multi-document manifest
pub fn render_templates(templates: &[(String, String)], context: &TemplateContext) -> Result<String> {
    let mut env = create_environment();
    for (name, source) in templates {
        env.add_template_owned(name.clone(), source.clone())?;
    }

    let ctx = minijinja::context! {
        values => &context.values,
        release => &context.release,
        bundle => &context.bundle,
    };

    let mut manifest = String::new();
    for (name, _) in templates {
        if is_helper(name) {
            continue;
        }

        let rendered = env.get_template(name)?.render(&ctx)?;
        let rendered = rendered.trim();
        if rendered.is_empty() {
            continue;
        }

        manifest.push_str("---\n# Source: ");
        manifest.push_str(name);
        manifest.push('\n');
        manifest.push_str(rendered);
        manifest.push('\n');
    }

    Ok(manifest)
}

fn is_helper(name: &str) -> bool {
    name.rsplit('/').next().is_some_and(|file| file.starts_with('_'))
}

fn create_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("toyaml", toyaml);
    env.add_filter("b64encode", b64encode);
    env.add_filter("quote", quote);
    env.add_filter("nindent", nindent);
    env
}

/// Usage: {{ values.agent | toyaml }}
fn toyaml(value: Value) -> std::result::Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    let yaml = serde_yaml::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Indent text with a newline prefix
fn nindent(value: String, spaces: usize) -> String {
    let indent = " ".repeat(spaces);
    let body = value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n{body}")
}
