//! Note rendering: fill a user template with a [`RenderRecord`] and write it.
//!
//! The template syntax is a deliberately small subset of Go's `text/template`
//! so existing note templates keep working:
//!
//! | Action | Meaning |
//! |--------|---------|
//! | `{{.Content}}` | print a record field |
//! | `{{.CustomVariables.author}}` | print a custom variable (missing → empty) |
//! | `{{range .Tags}}- {{.}}{{end}}` | repeat for each element, `.` is the element |
//! | `{{if .Tags}}…{{else}}…{{end}}` | conditional on a non-empty value |
//! | `{{/* comment */}}` | ignored |
//! | `{{- …}}` / `{{… -}}` | trim whitespace before / after the action |
//!
//! Fields always resolve against the record, also inside `range`. Unknown
//! fields and unbalanced blocks are [`TemplateError::Parse`].
//!
//! Output is written atomically: a temp file in the destination directory is
//! persisted over the final path only once rendering has fully succeeded, so
//! a failed job never leaves a partial note behind.

use crate::error::TemplateError;
use crate::output::RenderRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Render `template_path` with `record` and write the result to `output_path`.
pub fn render_template(
    template_path: &Path,
    output_path: &Path,
    record: &RenderRecord,
) -> Result<(), TemplateError> {
    let source = match std::fs::read_to_string(template_path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TemplateError::NotFound {
                path: template_path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(TemplateError::Parse {
                path: template_path.to_path_buf(),
                detail: format!("could not read template: {e}"),
            })
        }
    };

    let rendered = render_str(&source, record).map_err(|detail| TemplateError::Parse {
        path: template_path.to_path_buf(),
        detail,
    })?;

    write_atomic(output_path, &rendered)?;
    debug!(
        "Rendered {} → {} ({} bytes)",
        template_path.display(),
        output_path.display(),
        rendered.len()
    );
    Ok(())
}

/// Render template source text with `record`.
pub fn render_str(source: &str, record: &RenderRecord) -> Result<String, String> {
    let nodes = parse(source)?;
    let data = record_to_value(record);
    let mut out = String::with_capacity(source.len() + record.content.len());
    render_nodes(&nodes, &data, None, &mut out)?;
    Ok(out)
}

/// Field names exposed to templates.
fn record_to_value(record: &RenderRecord) -> Value {
    let absolute = record.source_path_absolute.to_string_lossy();
    let relative = record.source_path_relative.to_string_lossy();
    json!({
        "Content": record.content,
        "Filename": record.filename,
        "SourcePathAbsolute": absolute,
        "SourcePathRelative": relative,
        "AbsolutePDFPath": absolute,
        "RelativePDFPath": relative,
        "OutputDir": record.output_dir.to_string_lossy(),
        "DatetimeProcessed": record.datetime_processed,
        "PageCount": record.page_count,
        "ModelUsed": record.model_used,
        "CustomVariables": record.custom_variables,
        "Tags": record.tags,
    })
}

fn write_atomic(output_path: &Path, contents: &str) -> Result<(), TemplateError> {
    let write_err = |source: std::io::Error| TemplateError::Write {
        path: output_path.to_path_buf(),
        source,
    };

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.persist(output_path).map_err(|e| write_err(e.error))?;
    Ok(())
}

// ── Parsing ──────────────────────────────────────────────────────────────────

static RE_ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

#[derive(Debug)]
enum Token {
    Text(String),
    Action(String),
}

#[derive(Debug)]
enum Node {
    Text(String),
    Print(Vec<String>),
    Range {
        path: Vec<String>,
        body: Vec<Node>,
    },
    If {
        path: Vec<String>,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Stop {
    End,
    Else,
    Eof,
}

fn push_text(tokens: &mut Vec<Token>, text: &str, trim_start: bool, trim_end: bool) {
    let mut t = text;
    if trim_start {
        t = t.trim_start();
    }
    if trim_end {
        t = t.trim_end();
    }
    if !t.is_empty() {
        tokens.push(Token::Text(t.to_string()));
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut last = 0;
    let mut trim_next = false;

    for caps in RE_ACTION.captures_iter(source) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let mut inner = caps.get(1).map_or("", |m| m.as_str());

        // `{{-` and `-}}` only count as trim markers when followed (or
        // preceded) by whitespace, so `{{-3}}` stays a literal.
        let trim_left = match inner.strip_prefix('-') {
            Some(rest) if rest.starts_with(char::is_whitespace) => {
                inner = rest;
                true
            }
            _ => false,
        };
        let trim_right = match inner.strip_suffix('-') {
            Some(rest) if rest.ends_with(char::is_whitespace) => {
                inner = rest;
                true
            }
            _ => false,
        };

        push_text(&mut tokens, &source[last..whole.start], trim_next, trim_left);
        tokens.push(Token::Action(inner.trim().to_string()));
        trim_next = trim_right;
        last = whole.end;
    }

    let tail = &source[last..];
    if tail.contains("{{") {
        return Err("unclosed action: missing '}}'".to_string());
    }
    push_text(&mut tokens, tail, trim_next, false);
    Ok(tokens)
}

fn parse(source: &str) -> Result<Vec<Node>, String> {
    let tokens = tokenize(source)?;
    let mut iter = tokens.into_iter();
    let (nodes, stop) = parse_block(&mut iter)?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::End => Err("unexpected {{end}}".to_string()),
        Stop::Else => Err("unexpected {{else}}".to_string()),
    }
}

fn parse_block(tokens: &mut impl Iterator<Item = Token>) -> Result<(Vec<Node>, Stop), String> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        let action = match token {
            Token::Text(t) => {
                nodes.push(Node::Text(t));
                continue;
            }
            Token::Action(a) => a,
        };

        if action.starts_with("/*") && action.ends_with("*/") {
            continue;
        }

        let (keyword, rest) = match action.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (action.as_str(), ""),
        };

        match keyword {
            "end" => return Ok((nodes, Stop::End)),
            "else" => return Ok((nodes, Stop::Else)),
            "range" => {
                let path = parse_path(rest)?;
                let (body, stop) = parse_block(tokens)?;
                if stop != Stop::End {
                    return Err(format!("{{{{range {rest}}}}} is missing {{{{end}}}}"));
                }
                nodes.push(Node::Range { path, body });
            }
            "if" => {
                let path = parse_path(rest)?;
                let (then, stop) = parse_block(tokens)?;
                let otherwise = match stop {
                    Stop::End => Vec::new(),
                    Stop::Else => {
                        let (otherwise, stop) = parse_block(tokens)?;
                        if stop != Stop::End {
                            return Err(format!("{{{{if {rest}}}}} is missing {{{{end}}}}"));
                        }
                        otherwise
                    }
                    Stop::Eof => return Err(format!("{{{{if {rest}}}}} is missing {{{{end}}}}")),
                };
                nodes.push(Node::If {
                    path,
                    then,
                    otherwise,
                });
            }
            _ => nodes.push(Node::Print(parse_path(&action)?)),
        }
    }

    Ok((nodes, Stop::Eof))
}

/// `.` → `[]`, `.A.b` → `["A", "b"]`.
fn parse_path(expr: &str) -> Result<Vec<String>, String> {
    let expr = expr.trim();
    if expr == "." {
        return Ok(Vec::new());
    }
    let Some(rest) = expr.strip_prefix('.') else {
        return Err(format!("unsupported action '{{{{{expr}}}}}'"));
    };
    rest.split('.')
        .map(|seg| {
            if !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                Ok(seg.to_string())
            } else {
                Err(format!("invalid field path '{expr}'"))
            }
        })
        .collect()
}

// ── Evaluation ───────────────────────────────────────────────────────────────

fn render_nodes(
    nodes: &[Node],
    root: &Value,
    dot: Option<&Value>,
    out: &mut String,
) -> Result<(), String> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Print(path) => write_value(&lookup(path, root, dot)?, out),
            Node::Range { path, body } => match lookup(path, root, dot)? {
                Value::Null => {}
                Value::Array(items) => {
                    for item in &items {
                        render_nodes(body, root, Some(item), out)?;
                    }
                }
                Value::Object(map) => {
                    for item in map.values() {
                        render_nodes(body, root, Some(item), out)?;
                    }
                }
                _ => return Err(format!("can't range over .{}", path.join("."))),
            },
            Node::If {
                path,
                then,
                otherwise,
            } => {
                let branch = if is_truthy(&lookup(path, root, dot)?) {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, root, dot, out)?;
            }
        }
    }
    Ok(())
}

fn lookup(path: &[String], root: &Value, dot: Option<&Value>) -> Result<Value, String> {
    let Some((first, rest)) = path.split_first() else {
        return dot
            .cloned()
            .ok_or_else(|| "'{{.}}' is only valid inside range".to_string());
    };

    let mut current = root
        .get(first)
        .ok_or_else(|| format!("unknown field .{first}"))?;
    for seg in rest {
        current = match current {
            Value::Object(map) => match map.get(seg) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            Value::Null => return Ok(Value::Null),
            _ => return Err(format!("can't evaluate .{} on a non-map value", path.join("."))),
        };
    }
    Ok(current.clone())
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn write_value(v: &Value, out: &mut String) {
    match v {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn record() -> RenderRecord {
        let mut vars = BTreeMap::new();
        vars.insert("author".to_string(), json!("Test Author"));
        RenderRecord {
            content: "Test handwritten content".into(),
            filename: "test.pdf".into(),
            source_path_absolute: PathBuf::from("/notes/test.pdf"),
            source_path_relative: PathBuf::from("../notes/test.pdf"),
            output_dir: PathBuf::from("/out"),
            page_count: 2,
            model_used: "gemini-2.0-flash".into(),
            custom_variables: vars,
            datetime_processed: "2024-05-01T10:00:00+00:00".into(),
            tags: Some(vec!["math".into(), "ideas".into()]),
        }
    }

    #[test]
    fn prints_fields() {
        let out = render_str(
            "# {{.Filename}}\n\n{{.Content}}\n\nPages: {{.PageCount}}\nModel: {{ .ModelUsed }}",
            &record(),
        )
        .unwrap();
        assert!(out.contains("# test.pdf"));
        assert!(out.contains("Test handwritten content"));
        assert!(out.contains("Pages: 2"));
        assert!(out.contains("Model: gemini-2.0-flash"));
    }

    #[test]
    fn custom_variables_and_missing_keys() {
        let out = render_str(
            "by {{.CustomVariables.author}}{{.CustomVariables.missing}}!",
            &record(),
        )
        .unwrap();
        assert_eq!(out, "by Test Author!");
    }

    #[test]
    fn range_and_if_over_tags() {
        let tpl = "tags:{{if .Tags}}{{range .Tags}} #{{.}}{{end}}{{else}} none{{end}}";
        assert_eq!(render_str(tpl, &record()).unwrap(), "tags: #math #ideas");

        let mut untagged = record();
        untagged.tags = None;
        assert_eq!(render_str(tpl, &untagged).unwrap(), "tags: none");
    }

    #[test]
    fn tags_print_go_style() {
        assert_eq!(render_str("{{.Tags}}", &record()).unwrap(), "[math ideas]");
    }

    #[test]
    fn trim_markers_and_comments() {
        let tpl = "a  {{- /* note */ -}}  \n b";
        assert_eq!(render_str(tpl, &record()).unwrap(), "ab");
    }

    #[test]
    fn trim_markers_accept_any_whitespace() {
        let tpl = "Body:\n\n{{-\n.Filename\t-}}\n\n!";
        assert_eq!(render_str(tpl, &record()).unwrap(), "Body:test.pdf!");

        let tpl = "x {{-\t.PageCount\n-}} y";
        assert_eq!(render_str(tpl, &record()).unwrap(), "x2y");
    }

    #[test]
    fn source_path_aliases() {
        let out = render_str("{{.AbsolutePDFPath}}|{{.SourcePathRelative}}", &record()).unwrap();
        assert_eq!(out, "/notes/test.pdf|../notes/test.pdf");
    }

    #[test]
    fn bundled_template_front_matter() {
        let tpl = include_str!("../../templates/note_template.md");
        let out = render_str(tpl, &record()).unwrap();
        assert!(out.contains("model: gemini-2.0-flash\ntags:\n  - math\n  - ideas\n---\n"), "{out}");
        assert!(out.contains("# test.pdf\n\nTest handwritten content\n"));

        let mut untagged = record();
        untagged.tags = None;
        let out = render_str(tpl, &untagged).unwrap();
        assert!(out.contains("model: gemini-2.0-flash\n---\n"), "{out}");
    }

    #[test]
    fn parse_errors() {
        for bad in [
            "{{.Nope}}",
            "{{range .Tags}}x",
            "{{end}}",
            "{{if .Tags}}x{{else}}y",
            "{{.Content",
            "{{template \"x\"}}",
            "{{.}}",
        ] {
            assert!(render_str(bad, &record()).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn renders_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("note.md");
        std::fs::write(&template, "# {{.Filename}}\n\n{{.Content}}\n").unwrap();
        let output = dir.path().join("out").join("test.md");

        render_template(&template, &output, &record()).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written, "# test.pdf\n\nTest handwritten content\n");
        let leftovers = std::fs::read_dir(output.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "temp file must not be left behind");
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output.md");
        let err = render_template(&dir.path().join("nonexistent.md"), &output, &record())
            .unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
        assert!(err.to_string().contains("Template file not found"));
        assert!(!output.exists());
    }

    #[test]
    fn parse_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("bad.md");
        std::fs::write(&template, "{{range .Tags}}").unwrap();
        let output = dir.path().join("output.md");

        let err = render_template(&template, &output, &record()).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        assert!(!output.exists());
    }
}
