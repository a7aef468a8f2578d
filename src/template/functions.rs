//! The function namespace available to templates
//!
//! Functions are plain `fn` pointers registered by name in a [`FunctionTable`]
//! built once per run. Each receives a [`Host`] that exposes the capabilities
//! it may touch: the session, the change database and the source directory.

use crate::error::EvalErrorKind;
use crate::runner::{ChangeDatabase, Session};
use crate::template::value::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Capabilities handed to template functions
pub struct Host<'a> {
    /// Session scratch storage
    pub session: &'a mut Session,

    /// Checksum database for `changed`/`unchanged`
    pub changes: &'a mut ChangeDatabase,

    /// Directory relative paths are resolved against
    pub base_dir: &'a Path,

    /// Name of the source file being processed
    pub original_file: &'a str,
}

impl Host<'_> {
    /// Resolve a path against the base directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Signature of a template function
pub type NativeFn = fn(&mut Host<'_>, &[Value]) -> Result<Value, EvalErrorKind>;

/// Name to function table
#[derive(Clone, Default)]
pub struct FunctionTable {
    entries: HashMap<&'static str, NativeFn>,
}

impl FunctionTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard function set
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("exists", exists);
        table.register("missing", missing);
        table.register("changed", changed);
        table.register("unchanged", unchanged);
        table.register("isWindows", is_windows);
        table.register("isUnix", is_unix);
        table.register("isLinux", is_linux);
        table.register("isMac", is_mac);
        table.register("isTrue", is_true);
        table.register("isFalse", is_false);
        table.register("isEmpty", is_empty);
        table.register("isNotEmpty", is_not_empty);
        table.register("getBasename", get_basename);
        table.register("getExtension", get_extension);
        table.register("getFilename", get_filename);
        table.register("getOriginalFile", get_original_file);
        table.register("trimSpaces", trim_spaces);
        table.register("buildString", build_string);
        table.register("replicatePattern", replicate_pattern);
        table.register("length", length);
        table.register("listFiles", list_files);
        table.register("readFromFile", read_from_file);
        table.register("writeToFile", write_to_file);
        table.register("sessionPut", session_put);
        table.register("sessionGet", session_get);
        table.register("sessionContains", session_contains);
        table.register("sessionRemove", session_remove);
        table.register("throwError", throw_error);
        table.register("showMessage", show_message);
        table
    }

    /// Register or replace a function
    pub fn register(&mut self, name: &'static str, function: NativeFn) {
        self.entries.insert(name, function);
    }

    /// Look up a function
    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.entries.get(name).copied()
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.names())
            .finish()
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalErrorKind> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(EvalErrorKind::TypeMismatch(format!(
            "{}() expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn text(name: &str, args: &[Value], index: usize) -> Result<String, EvalErrorKind> {
    match args.get(index) {
        Some(Value::Map(_)) | Some(Value::List(_)) => Err(EvalErrorKind::TypeMismatch(format!(
            "{}() argument {} must be text",
            name,
            index + 1
        ))),
        Some(value) => value.render(),
        None => Ok(String::new()),
    }
}

fn failed(name: &str, detail: impl ToString) -> EvalErrorKind {
    EvalErrorKind::FunctionFailed {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

/// `f(v)` yields a boolean, `f(v, yes)` yields `yes` or "", `f(v, yes, no)` picks one
fn choose(flag: bool, args: &[Value]) -> Value {
    match (args.len(), flag) {
        (1, _) => Value::Bool(flag),
        (_, true) => args.get(1).cloned().unwrap_or_default(),
        (2, false) => Value::Str(String::new()),
        (_, false) => args.get(2).cloned().unwrap_or_default(),
    }
}

fn exists(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("exists", args, 1, 1)?;
    Ok(Value::Bool(host.resolve(&text("exists", args, 0)?).exists()))
}

fn missing(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("missing", args, 1, 1)?;
    Ok(Value::Bool(!host.resolve(&text("missing", args, 0)?).exists()))
}

fn changed(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("changed", args, 1, 1)?;
    let path = host.resolve(&text("changed", args, 0)?);
    host.changes
        .changed(&path)
        .map(Value::Bool)
        .map_err(|e| failed("changed", e))
}

fn unchanged(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("unchanged", args, 1, 1)?;
    let path = host.resolve(&text("unchanged", args, 0)?);
    host.changes
        .changed(&path)
        .map(|changed| Value::Bool(!changed))
        .map_err(|e| failed("unchanged", e))
}

fn os_choice(name: &str, flag: bool, args: &[Value]) -> Result<Value, EvalErrorKind> {
    match args.len() {
        0 => Ok(Value::Bool(flag)),
        2 => Ok(if flag { args[0].clone() } else { args[1].clone() }),
        _ => Err(EvalErrorKind::TypeMismatch(format!(
            "{}() expects 0 or 2 arguments, got {}",
            name,
            args.len()
        ))),
    }
}

fn is_windows(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    os_choice("isWindows", cfg!(windows), args)
}

fn is_unix(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    os_choice("isUnix", cfg!(unix), args)
}

fn is_linux(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    os_choice("isLinux", cfg!(target_os = "linux"), args)
}

fn is_mac(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    os_choice("isMac", cfg!(target_os = "macos"), args)
}

fn is_true(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("isTrue", args, 1, 3)?;
    Ok(choose(args[0].is_true_word(), args))
}

fn is_false(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("isFalse", args, 1, 3)?;
    Ok(choose(args[0].is_false_word(), args))
}

fn is_empty(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("isEmpty", args, 1, 3)?;
    Ok(choose(args[0].is_empty(), args))
}

fn is_not_empty(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("isNotEmpty", args, 1, 3)?;
    Ok(choose(!args[0].is_empty(), args))
}

fn path_part(
    name: &str,
    args: &[Value],
    part: fn(&Path) -> Option<&std::ffi::OsStr>,
) -> Result<Value, EvalErrorKind> {
    arity(name, args, 1, 1)?;
    let path = text(name, args, 0)?;
    Ok(Value::Str(
        part(Path::new(&path))
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    ))
}

fn get_basename(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    path_part("getBasename", args, Path::file_stem)
}

fn get_extension(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    path_part("getExtension", args, Path::extension)
}

fn get_filename(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    path_part("getFilename", args, Path::file_name)
}

fn get_original_file(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("getOriginalFile", args, 0, 0)?;
    Ok(Value::Str(host.original_file.to_string()))
}

fn trim_spaces(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("trimSpaces", args, 1, 1)?;
    Ok(Value::Str(text("trimSpaces", args, 0)?.trim().to_string()))
}

fn build_string(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    let mut result = String::new();
    for value in args {
        result.push_str(&value.render()?);
    }
    Ok(Value::Str(result))
}

fn replicate_pattern(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("replicatePattern", args, 2, 2)?;
    let pattern = text("replicatePattern", args, 0)?;
    let items = match &args[1] {
        Value::List(items) => items.clone(),
        Value::Unset => Vec::new(),
        single => vec![single.clone()],
    };
    items
        .iter()
        .map(|item| Ok(Value::Str(pattern.replace("%s", &item.render()?))))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn length(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("length", args, 1, 1)?;
    let n = match &args[0] {
        Value::Unset => 0,
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(EvalErrorKind::TypeMismatch(format!(
                "length() of {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn list_files(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("listFiles", args, 1, 1)?;
    let pattern = host.resolve(&text("listFiles", args, 0)?);
    let entries =
        glob::glob(&pattern.to_string_lossy()).map_err(|e| failed("listFiles", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| failed("listFiles", e))?;
        let shown = path.strip_prefix(host.base_dir).unwrap_or(&path);
        files.push(shown.to_string_lossy().into_owned());
    }
    files.sort();
    Ok(Value::List(files.into_iter().map(Value::Str).collect()))
}

fn read_from_file(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("readFromFile", args, 1, 1)?;
    let path = host.resolve(&text("readFromFile", args, 0)?);
    let contents = fs::read_to_string(&path).map_err(|e| failed("readFromFile", e))?;
    Ok(Value::List(
        contents.lines().map(|l| Value::Str(l.to_string())).collect(),
    ))
}

fn write_to_file(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("writeToFile", args, 2, 3)?;
    let path = host.resolve(&text("writeToFile", args, 0)?);
    let contents = match &args[1] {
        Value::List(lines) => {
            let mut joined = lines
                .iter()
                .map(Value::render)
                .collect::<Result<Vec<_>, _>>()?
                .join("\n");
            joined.push('\n');
            joined
        }
        other => other.render()?,
    };
    let append = args.get(2).is_some_and(Value::is_truthy);

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&path)
        .map_err(|e| failed("writeToFile", e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| failed("writeToFile", e))?;
    Ok(Value::Bool(true))
}

fn session_put(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("sessionPut", args, 2, 2)?;
    let key = text("sessionPut", args, 0)?;
    host.session.put(key, args[1].clone());
    Ok(Value::Unset)
}

fn session_get(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("sessionGet", args, 1, 2)?;
    let key = text("sessionGet", args, 0)?;
    Ok(host
        .session
        .get(&key)
        .cloned()
        .or_else(|| args.get(1).cloned())
        .unwrap_or_default())
}

fn session_contains(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("sessionContains", args, 1, 1)?;
    let key = text("sessionContains", args, 0)?;
    Ok(Value::Bool(host.session.contains(&key)))
}

fn session_remove(host: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("sessionRemove", args, 1, 1)?;
    let key = text("sessionRemove", args, 0)?;
    Ok(host.session.remove(&key).unwrap_or_default())
}

fn throw_error(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("throwError", args, 1, 1)?;
    Err(EvalErrorKind::Raised(text("throwError", args, 0)?))
}

fn show_message(_: &mut Host<'_>, args: &[Value]) -> Result<Value, EvalErrorKind> {
    arity("showMessage", args, 1, 2)?;
    let message = args
        .iter()
        .map(Value::render)
        .collect::<Result<Vec<_>, _>>()?
        .join(": ");
    eprintln!("{}", message);
    Ok(Value::Unset)
}
