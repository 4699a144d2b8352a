//! Discovery of the third-party packages a Python script imports.
//!
//! Detection is line-local and syntax-unaware: multi-line imports, imports inside
//! conditional blocks and `as` aliases get no special treatment, and relative imports
//! (`from . import x`) never match.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Module names assumed to always be available on the host; never installed.
pub const BUILTIN_MODULES: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "calendar", "collections", "concurrent", "contextlib", "copy", "csv", "ctypes", "dataclasses",
    "datetime", "decimal", "difflib", "email", "enum", "errno", "fnmatch", "fractions", "functools",
    "gc", "getpass", "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "importlib",
    "inspect", "io", "ipaddress", "itertools", "json", "logging", "math", "multiprocessing", "operator",
    "os", "pathlib", "pickle", "platform", "pprint", "queue", "random", "re", "secrets", "select",
    "shlex", "shutil", "signal", "socket", "sqlite3", "ssl", "statistics", "string", "struct",
    "subprocess", "sys", "tempfile", "textwrap", "threading", "time", "timeit", "traceback", "types",
    "typing", "unicodedata", "unittest", "urllib", "uuid", "warnings", "weakref", "xml", "zipfile",
    "zlib",
    // the host's web layer ships with it
    "flask",
];

fn import_line() -> &'static Regex {
    static IMPORT_LINE: OnceLock<Regex> = OnceLock::new();
    IMPORT_LINE.get_or_init(|| {
        Regex::new(r"^\s*(?:import|from)\s+([A-Za-z0-9_]+)").expect("import pattern is valid")
    })
}

/// Return the set of top-level package names `script` imports that are not built in.
pub fn scan(script: &str) -> BTreeSet<String> {
    script
        .lines()
        .filter_map(|line| import_line().captures(line))
        .filter_map(|captures| captures.get(1))
        .map(|package| package.as_str())
        .filter(|package| !is_builtin(package))
        .map(str::to_owned)
        .collect()
}

pub fn is_builtin(package: &str) -> bool {
    BUILTIN_MODULES.contains(&package)
}
