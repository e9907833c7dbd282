//! Seccomp profile model and builder for the default deny-list.

use crate::error::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Action the kernel takes when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "SCMP_ACT_ALLOW")]
    Allow,
    #[serde(rename = "SCMP_ACT_ERRNO")]
    Errno,
    #[serde(rename = "SCMP_ACT_KILL")]
    Kill,
    #[serde(rename = "SCMP_ACT_LOG")]
    Log,
}

/// Comparison applied to one syscall argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgOp {
    #[serde(rename = "SCMP_CMP_EQ")]
    Equal,
    #[serde(rename = "SCMP_CMP_NE")]
    NotEqual,
    /// `(arg & value) == value_two`
    #[serde(rename = "SCMP_CMP_MASKED_EQ")]
    MaskedEqual,
}

/// Condition on one syscall argument; every condition of a rule must hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgCondition {
    pub index: u32,
    pub value: u64,
    #[serde(default)]
    pub value_two: u64,
    pub op: ArgOp,
}

impl ArgCondition {
    fn holds(&self, args: &[u64]) -> bool {
        let Some(&arg) = args.get(self.index as usize) else {
            return false;
        };
        match self.op {
            ArgOp::Equal => arg == self.value,
            ArgOp::NotEqual => arg != self.value,
            ArgOp::MaskedEqual => arg & self.value == self.value_two,
        }
    }
}

/// One rule applying an action to a set of syscalls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyscallRule {
    pub names: Vec<String>,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno_ret: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgCondition>,
}

/// Seccomp profile in the JSON layout container runtimes accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeccompProfile {
    pub default_action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub syscalls: Vec<SyscallRule>,
}

impl SeccompProfile {
    /// Whether `syscall` is answered with an error or a kill regardless of
    /// its arguments.
    pub fn denies(&self, syscall: &str) -> bool {
        self.denies_call(syscall, &[])
    }

    /// Whether a call to `syscall` with `args` is answered with an error or a
    /// kill. Conditional rules only match when every condition holds.
    pub fn denies_call(&self, syscall: &str, args: &[u64]) -> bool {
        self.syscalls
            .iter()
            .rev()
            .find(|rule| {
                rule.names.iter().any(|n| n == syscall) && rule.args.iter().all(|c| c.holds(args))
            })
            .map(|rule| matches!(rule.action, Action::Errno | Action::Kill))
            .unwrap_or(matches!(self.default_action, Action::Errno | Action::Kill))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the profile to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut text = self.to_json_pretty()?;
        text.push('\n');
        std::fs::write(path, text).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Wrote security profile to {}", path.display());
        Ok(())
    }
}

const MOUNT_SYSCALLS: &[&str] = &[
    "mount",
    "umount",
    "umount2",
    "pivot_root",
    "chroot",
    "open_tree",
    "move_mount",
    "fsopen",
    "fsconfig",
    "fsmount",
    "fspick",
    "mount_setattr",
];

const SYSTEM_ADMIN_SYSCALLS: &[&str] = &[
    "init_module",
    "finit_module",
    "delete_module",
    "kexec_load",
    "kexec_file_load",
    "reboot",
    "swapon",
    "swapoff",
    "syslog",
    "acct",
    "settimeofday",
    "clock_settime",
    "clock_adjtime",
    "adjtimex",
    "sethostname",
    "setdomainname",
    "iopl",
    "ioperm",
    "quotactl",
];

const NAMESPACE_SYSCALLS: &[&str] = &["unshare", "setns"];

/// `CLONE_NEWNS`, `CLONE_NEWCGROUP`, `CLONE_NEWUTS`, `CLONE_NEWIPC`,
/// `CLONE_NEWUSER`, `CLONE_NEWPID`, `CLONE_NEWNET`.
const CLONE_NAMESPACE_FLAGS: &[u64] = &[
    0x0002_0000,
    0x0200_0000,
    0x0400_0000,
    0x0800_0000,
    0x1000_0000,
    0x2000_0000,
    0x4000_0000,
];

/// Interfaces outside the namespace model that container escapes and kernel
/// exploits lean on.
const KERNEL_ATTACK_SURFACE_SYSCALLS: &[&str] = &[
    "io_uring_setup",
    "io_uring_enter",
    "io_uring_register",
    "open_by_handle_at",
    "name_to_handle_at",
    "kcmp",
    "personality",
    "lookup_dcookie",
    "fanotify_init",
    "uselib",
    "nfsservctl",
    "vm86",
    "vm86old",
    "create_module",
    "get_kernel_syms",
    "query_module",
    "_sysctl",
    "sysfs",
    "ustat",
    "vhangup",
    "pciconfig_read",
    "pciconfig_write",
    "pciconfig_iobase",
];

const KEYRING_SYSCALLS: &[&str] = &["add_key", "request_key", "keyctl"];

const TRACING_SYSCALLS: &[&str] = &[
    "ptrace",
    "process_vm_readv",
    "process_vm_writev",
    "perf_event_open",
    "bpf",
    "userfaultfd",
];

/// Builder for seccomp profiles: allow by default, deny dangerous groups
pub struct ProfileBuilder {
    profile: SeccompProfile,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileBuilder {
    /// Create a builder for an allow-by-default profile
    pub fn new() -> Self {
        Self {
            profile: SeccompProfile {
                default_action: Action::Allow,
                architectures: vec![
                    "SCMP_ARCH_X86_64".to_string(),
                    "SCMP_ARCH_X86".to_string(),
                    "SCMP_ARCH_AARCH64".to_string(),
                ],
                syscalls: Vec::new(),
            },
        }
    }

    /// The profile written by `sbx profile`: every deny group, tracing blocked.
    pub fn default_profile() -> SeccompProfile {
        let mut builder = Self::new();
        builder
            .block_mount_operations()
            .block_system_administration()
            .block_namespace_operations()
            .block_keyring_operations()
            .block_kernel_attack_surface()
            .set_debug_mode(false);
        builder.build()
    }

    fn push(&mut self, syscalls: &[&str], errno: i32, args: Vec<ArgCondition>) {
        self.profile.syscalls.push(SyscallRule {
            names: syscalls.iter().map(|s| s.to_string()).collect(),
            action: Action::Errno,
            errno_ret: Some(errno as u32),
            args,
        });
    }

    fn deny(&mut self, group: &str, syscalls: &[&str]) -> &mut Self {
        debug!("Denying {} syscalls: {}", group, syscalls.join(", "));
        self.push(syscalls, libc::EPERM, Vec::new());
        self
    }

    /// Deny mounting, pivoting and chrooting
    pub fn block_mount_operations(&mut self) -> &mut Self {
        self.deny("mount", MOUNT_SYSCALLS)
    }

    /// Deny module loading, kexec, reboot, clock and host identity changes
    pub fn block_system_administration(&mut self) -> &mut Self {
        self.deny("system administration", SYSTEM_ADMIN_SYSCALLS)
    }

    /// Deny creating or joining namespaces, including `clone` with any
    /// namespace flag. `clone3` answers ENOSYS so libc falls back to `clone`,
    /// whose flags can be inspected.
    pub fn block_namespace_operations(&mut self) -> &mut Self {
        self.deny("namespace", NAMESPACE_SYSCALLS);
        for &flag in CLONE_NAMESPACE_FLAGS {
            let condition = ArgCondition {
                index: 0,
                value: flag,
                value_two: flag,
                op: ArgOp::MaskedEqual,
            };
            self.push(&["clone"], libc::EPERM, vec![condition]);
        }
        self.push(&["clone3"], libc::ENOSYS, Vec::new());
        self
    }

    /// Deny io_uring, file-handle syscalls and obsolete kernel interfaces
    pub fn block_kernel_attack_surface(&mut self) -> &mut Self {
        self.deny("kernel attack surface", KERNEL_ATTACK_SURFACE_SYSCALLS)
    }

    /// Deny access to kernel keyrings
    pub fn block_keyring_operations(&mut self) -> &mut Self {
        self.deny("keyring", KEYRING_SYSCALLS)
    }

    /// Configure debug mode (leaves ptrace and friends to the default action)
    pub fn set_debug_mode(&mut self, debug: bool) -> &mut Self {
        if debug {
            debug!("Debug mode enabled: allowing tracing syscalls");
            self
        } else {
            self.deny("tracing", TRACING_SYSCALLS)
        }
    }

    /// Build the profile
    pub fn build(self) -> SeccompProfile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_allow_by_default() {
        let profile = ProfileBuilder::new().build();
        assert_eq!(profile.default_action, Action::Allow);
        assert!(profile.syscalls.is_empty());
        assert!(!profile.denies("mount"));
    }

    #[test]
    fn test_default_profile_denies_dangerous_groups() {
        let profile = ProfileBuilder::default_profile();
        for syscall in ["mount", "ptrace", "kexec_load", "init_module", "unshare", "setns", "keyctl"] {
            assert!(profile.denies(syscall), "{} should be denied", syscall);
        }
        for syscall in ["read", "write", "clone", "execve", "futex"] {
            assert!(!profile.denies(syscall), "{} should be allowed", syscall);
        }
        assert!(profile
            .syscalls
            .iter()
            .filter(|rule| rule.names != ["clone3"])
            .all(|rule| rule.errno_ret == Some(libc::EPERM as u32)));
    }

    #[test]
    fn test_default_profile_covers_escape_primitives() {
        let profile = ProfileBuilder::default_profile();
        for syscall in [
            "io_uring_setup",
            "io_uring_enter",
            "open_by_handle_at",
            "name_to_handle_at",
            "kcmp",
            "personality",
            "clone3",
        ] {
            assert!(profile.denies(syscall), "{} should be denied", syscall);
        }
    }

    #[test]
    fn test_clone_denied_only_with_namespace_flags() {
        const SIGCHLD: u64 = 17;
        const CLONE_VM: u64 = 0x100;
        const CLONE_THREAD: u64 = 0x10000;
        const CLONE_NEWUSER: u64 = 0x1000_0000;
        const CLONE_NEWNET: u64 = 0x4000_0000;

        let profile = ProfileBuilder::default_profile();
        assert!(!profile.denies_call("clone", &[SIGCHLD]));
        assert!(!profile.denies_call("clone", &[CLONE_VM | CLONE_THREAD | SIGCHLD]));
        assert!(profile.denies_call("clone", &[CLONE_NEWUSER | SIGCHLD]));
        assert!(profile.denies_call("clone", &[CLONE_NEWNET | CLONE_VM]));
    }

    #[test]
    fn test_debug_mode_keeps_ptrace() {
        let mut builder = ProfileBuilder::new();
        builder.block_mount_operations().set_debug_mode(true);
        let profile = builder.build();
        assert!(profile.denies("mount"));
        assert!(!profile.denies("ptrace"));
    }

    #[test]
    fn test_json_layout() {
        let json: serde_json::Value =
            serde_json::from_str(&ProfileBuilder::default_profile().to_json_pretty().unwrap())
                .unwrap();
        assert_eq!(json["defaultAction"], "SCMP_ACT_ALLOW");
        assert_eq!(json["architectures"][0], "SCMP_ARCH_X86_64");
        assert_eq!(json["syscalls"][0]["action"], "SCMP_ACT_ERRNO");
        assert!(json["syscalls"][0]["names"].as_array().unwrap().len() > 1);
        assert!(json["syscalls"][0]["errnoRet"].is_u64());

        let clone_rule = json["syscalls"]
            .as_array()
            .unwrap()
            .iter()
            .find(|rule| rule["names"][0] == "clone")
            .unwrap();
        assert_eq!(clone_rule["args"][0]["op"], "SCMP_CMP_MASKED_EQ");
        assert_eq!(clone_rule["args"][0]["index"], 0);
        assert_eq!(clone_rule["args"][0]["value"], clone_rule["args"][0]["valueTwo"]);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config/seccomp_profile.json");
        ProfileBuilder::default_profile().write(&path).unwrap();

        let read_back: SeccompProfile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read_back, ProfileBuilder::default_profile());
    }
}
