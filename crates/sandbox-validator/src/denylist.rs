//! Deny-lists used by the static validator.
//!
//! Each name belongs to exactly one class.

use serde::Serialize;
use std::fmt;

/// Why a symbol is forbidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyClass {
    CommandExecution,
    Filesystem,
    Network,
    DangerousBuiltin,
    Introspection,
}

impl DenyClass {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CommandExecution => "command execution",
            Self::Filesystem => "filesystem access",
            Self::Network => "network access",
            Self::DangerousBuiltin => "dynamic code execution or file handle",
            Self::Introspection => "interpreter introspection",
        }
    }
}

impl fmt::Display for DenyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Modules that spawn processes, load code dynamically or control the interpreter environment.
pub const COMMAND_EXECUTION_MODULES: &[&str] = &[
    "os",
    "posix",
    "nt",
    "subprocess",
    "sys",
    "importlib",
    "imp",
    "pkgutil",
    "runpy",
    "code",
    "codeop",
    "builtins",
    "__builtin__",
    "ctypes",
    "cffi",
    "multiprocessing",
    "concurrent",
    "pty",
    "resource",
    "platform",
    "commands",
    "popen2",
    "gc",
    "inspect",
];

/// Modules that reach the filesystem beyond what the container already restricts.
pub const FILESYSTEM_MODULES: &[&str] = &[
    "io",
    "shutil",
    "pathlib",
    "glob",
    "fnmatch",
    "tempfile",
    "fileinput",
    "filecmp",
    "pickle",
    "cPickle",
    "dill",
    "shelve",
    "marshal",
    "dbm",
    "sqlite3",
    "zipfile",
    "tarfile",
    "mmap",
];

/// Modules that open network connections.
pub const NETWORK_MODULES: &[&str] = &[
    "socket",
    "socketserver",
    "ssl",
    "select",
    "selectors",
    "asyncio",
    "urllib",
    "urllib2",
    "urllib3",
    "http",
    "httplib",
    "httpx",
    "requests",
    "aiohttp",
    "ftplib",
    "smtplib",
    "poplib",
    "imaplib",
    "telnetlib",
    "xmlrpc",
    "webbrowser",
    "websocket",
    "websockets",
    "paramiko",
];

/// Builtins that evaluate strings as code, import by name or open file handles.
pub const DANGEROUS_BUILTINS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "breakpoint",
    "globals",
    "input",
];

/// Attributes used to climb from an ordinary object to interpreter internals.
pub const INTROSPECTION_ATTRIBUTES: &[&str] = &[
    "__globals__",
    "__builtins__",
    "__subclasses__",
    "__bases__",
    "__mro__",
    "__code__",
    "__closure__",
    "__getattribute__",
    "__loader__",
    "__spec__",
    "f_globals",
    "f_locals",
    "f_back",
    "gi_frame",
    "tb_frame",
];

/// Deny-listed module names that are also common variable names (`code`,
/// `io`, ...). Attribute access on these is not flagged; importing them is.
pub const AMBIGUOUS_MODULE_NAMES: &[&str] = &[
    "code",
    "io",
    "gc",
    "inspect",
    "platform",
    "resource",
    "select",
    "http",
    "concurrent",
];

/// Classify a module by its root package name (`os.path` -> `os`).
pub fn classify_module(module: &str) -> Option<DenyClass> {
    let root = module.split('.').next().unwrap_or(module).trim();
    if COMMAND_EXECUTION_MODULES.contains(&root) {
        Some(DenyClass::CommandExecution)
    } else if FILESYSTEM_MODULES.contains(&root) {
        Some(DenyClass::Filesystem)
    } else if NETWORK_MODULES.contains(&root) {
        Some(DenyClass::Network)
    } else {
        None
    }
}

/// Classify the object of an attribute access (`os.system` -> `os`).
pub fn classify_attribute_object(name: &str) -> Option<DenyClass> {
    if AMBIGUOUS_MODULE_NAMES.contains(&name) {
        return None;
    }
    classify_module(name)
}

pub fn classify_builtin(name: &str) -> Option<DenyClass> {
    DANGEROUS_BUILTINS
        .contains(&name)
        .then_some(DenyClass::DangerousBuiltin)
}

pub fn classify_attribute(name: &str) -> Option<DenyClass> {
    INTROSPECTION_ATTRIBUTES
        .contains(&name)
        .then_some(DenyClass::Introspection)
}
