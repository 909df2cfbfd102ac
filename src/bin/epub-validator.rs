use std::env;
use std::process::ExitCode;

use epub_validator::{
    validate_path, EpubError, EpubVersion, ValidationDiagnostic, ValidationMode,
    ValidationOptions, ValidationProfile, ValidationReport,
};

#[derive(Clone, Debug)]
enum Json {
    Null,
    Bool(bool),
    Num(usize),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_into(&mut out, pretty, 0);
        out
    }

    fn write_into(&self, out: &mut String, pretty: bool, depth: usize) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Str(v) => write_json_string(out, v),
            Json::Arr(items) => {
                out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    if pretty {
                        out.push('\n');
                        write_indent(out, depth + 1);
                    }
                    item.write_into(out, pretty, depth + 1);
                    if idx + 1 != items.len() {
                        out.push(',');
                    }
                }
                if pretty && !items.is_empty() {
                    out.push('\n');
                    write_indent(out, depth);
                }
                out.push(']');
            }
            Json::Obj(fields) => {
                out.push('{');
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if pretty {
                        out.push('\n');
                        write_indent(out, depth + 1);
                    }
                    write_json_string(out, key);
                    out.push_str(if pretty { ": " } else { ":" });
                    value.write_into(out, pretty, depth + 1);
                    if idx + 1 != fields.len() {
                        out.push(',');
                    }
                }
                if pretty && !fields.is_empty() {
                    out.push('\n');
                    write_indent(out, depth);
                }
                out.push('}');
            }
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the validated input was valid.
fn run(args: Vec<String>) -> Result<bool, String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");
    let text = pop_flag(&mut rest, "--text");

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(true);
    }

    let cmd = rest.remove(0);
    let mut args = rest;
    let mut options = ValidationOptions::default();
    if let Some(profile) = pop_value(&mut args, "--profile")? {
        let profile = ValidationProfile::parse(&profile)
            .ok_or_else(|| format!("unknown profile '{}'", profile))?;
        options = options.with_profile(profile);
    }

    match cmd.as_str() {
        "validate" => {
            options = options.with_parallel(pop_flag(&mut args, "--parallel"));
        }
        "file" => {
            let media_type = pop_value(&mut args, "--media-type")?;
            let version = if pop_flag(&mut args, "--epub2") {
                EpubVersion::V2
            } else {
                EpubVersion::V3
            };
            let mut properties = Vec::new();
            while let Some(property) = pop_value(&mut args, "--property")? {
                properties.push(property);
            }
            options = options.with_mode(ValidationMode::SingleFile {
                media_type,
                version,
                properties,
            });
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `epub-validator --help` for usage",
                cmd
            ));
        }
    }

    let path = first_arg(&args, &format!("{} requires <path>", cmd))?;
    let report = validate_path(&path, &options).map_err(display_err)?;
    if text {
        print_text(&report);
    } else {
        println!("{}", report_json(&path, &report).render(pretty));
    }
    Ok(report.is_valid())
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn pop_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    args.remove(pos);
    if pos < args.len() {
        Ok(Some(args.remove(pos)))
    } else {
        Err(format!("{} requires a value", flag))
    }
}

fn report_json(path: &str, report: &ValidationReport) -> Json {
    let counts = report.counts();
    Json::Obj(vec![
        ("input".to_string(), Json::Str(path.to_string())),
        ("valid".to_string(), Json::Bool(report.is_valid())),
        ("fatal_count".to_string(), Json::Num(counts.fatal)),
        ("error_count".to_string(), Json::Num(counts.error)),
        ("warning_count".to_string(), Json::Num(counts.warning)),
        ("unverified_count".to_string(), Json::Num(counts.unverified)),
        (
            "diagnostics".to_string(),
            Json::Arr(report.diagnostics().iter().map(diagnostic_json).collect()),
        ),
    ])
}

fn diagnostic_json(diag: &ValidationDiagnostic) -> Json {
    Json::Obj(vec![
        ("code".to_string(), Json::Str(diag.code.to_string())),
        ("severity".to_string(), Json::Str(diag.severity.as_str().to_string())),
        ("message".to_string(), Json::Str(diag.message.clone())),
        (
            "path".to_string(),
            diag.path.clone().map_or(Json::Null, Json::Str),
        ),
        (
            "location".to_string(),
            diag.location.map_or(Json::Null, |loc| {
                Json::Obj(vec![
                    ("line".to_string(), Json::Num(loc.line as usize)),
                    ("column".to_string(), Json::Num(loc.column as usize)),
                ])
            }),
        ),
        (
            "args".to_string(),
            Json::Arr(diag.args.iter().cloned().map(Json::Str).collect()),
        ),
        (
            "hint".to_string(),
            diag.hint.clone().map_or(Json::Null, Json::Str),
        ),
    ])
}

fn print_text(report: &ValidationReport) {
    for diag in report.diagnostics() {
        let mut line = format!("{}({})", diag.severity.as_str().to_uppercase(), diag.code);
        if let Some(path) = &diag.path {
            line.push_str(": ");
            line.push_str(path);
            if let Some(loc) = diag.location {
                line.push_str(&format!("({},{})", loc.line, loc.column));
            }
        }
        line.push_str(": ");
        line.push_str(&diag.message);
        println!("{}", line);
    }
    let counts = report.counts();
    println!(
        "{} fatal / {} errors / {} warnings / {} unverified",
        counts.fatal, counts.error, counts.warning, counts.unverified
    );
}

fn display_err(err: EpubError) -> String {
    err.to_string()
}

fn print_help() {
    let help = r#"epub-validator - check EPUB publications for conformance

USAGE:
  epub-validator [--pretty] [--text] <command> [args...]

COMMANDS:
  validate <path> [--profile <name>] [--parallel]
  file <path> [--media-type <type>] [--epub2] [--property <name>]... [--profile <name>]

NOTES:
  - `validate` accepts a zip container or an expanded directory.
  - `file` checks one resource; only same-document references are resolved.
  - Profiles: default, edupub, idx, dict, preview.
  - Output is JSON by default; `--text` prints one line per diagnostic.
  - Exit status is 0 when valid, 1 when not, 2 on usage or I/O errors.
"#;
    println!("{}", help);
}
