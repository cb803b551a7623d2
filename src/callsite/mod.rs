//! Call-site identities.
//!
//! A [`CallSite`] is the key under which invocations are folded together in
//! an aggregated tree. Two invocations land in the same node when they share
//! a parent and compare equal here.

pub mod resolver;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use resolver::{NoResolver, ResolverChain, SymbolResolver, SymbolTable};

/// Identity of a call site
///
/// **Public** - used as the child key of every aggregated node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallSite {
    /// A function whose name is already known
    Function(String),

    /// A raw address, resolved to a name through a [`SymbolResolver`]
    Address(u64),

    /// A pre-labelled entry that is not a real symbol (e.g. "idle", "gc")
    Synthetic(String),

    /// A kernel status slice, only found among a node's extra children
    KernelStatus(ProcessStatus),
}

impl CallSite {
    /// Create a function call site
    pub fn function(name: impl Into<String>) -> Self {
        CallSite::Function(name.into())
    }

    /// Resolve the display label of this call site
    ///
    /// **Public** - the only place where addresses are turned into names
    ///
    /// Addresses that the resolver does not know are rendered as `0x…`.
    pub fn resolve_label(&self, resolver: &dyn SymbolResolver) -> String {
        match self {
            CallSite::Function(name) | CallSite::Synthetic(name) => name.clone(),
            CallSite::Address(address) => resolver
                .resolve(*address)
                .unwrap_or_else(|| format_address(*address)),
            CallSite::KernelStatus(status) => status.label().to_string(),
        }
    }

    pub fn is_kernel_status(&self) -> bool {
        matches!(self, CallSite::KernelStatus(_))
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallSite::Function(name) | CallSite::Synthetic(name) => f.write_str(name),
            CallSite::Address(address) => f.write_str(&format_address(*address)),
            CallSite::KernelStatus(status) => f.write_str(status.label()),
        }
    }
}

impl From<&str> for CallSite {
    fn from(name: &str) -> Self {
        CallSite::Function(name.to_string())
    }
}

impl From<u64> for CallSite {
    fn from(address: u64) -> Self {
        CallSite::Address(address)
    }
}

/// Render an unresolved address
pub fn format_address(address: u64) -> String {
    format!("0x{:x}", address)
}

/// Scheduling state of a thread while it sits in a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    RunningSystem,
    Interrupted,
    WaitBlocked,
    WaitForCpu,
    WaitUnknown,
    Unknown,
}

impl ProcessStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::RunningSystem => "running_system",
            ProcessStatus::Interrupted => "interrupted",
            ProcessStatus::WaitBlocked => "wait_blocked",
            ProcessStatus::WaitForCpu => "wait_for_cpu",
            ProcessStatus::WaitUnknown => "wait_unknown",
            ProcessStatus::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_label_falls_back_to_hex() {
        let site = CallSite::Address(0x1f00);
        assert_eq!(site.resolve_label(&NoResolver), "0x1f00");
    }

    #[test]
    fn test_address_label_uses_resolver() {
        let mut table = SymbolTable::new();
        table.insert(0x1f00, "parse_header");
        assert_eq!(CallSite::Address(0x1f00).resolve_label(&table), "parse_header");
    }

    #[test]
    fn test_function_and_status_labels() {
        assert_eq!(CallSite::function("main").resolve_label(&NoResolver), "main");
        assert_eq!(
            CallSite::KernelStatus(ProcessStatus::WaitBlocked).resolve_label(&NoResolver),
            "wait_blocked"
        );
    }

    #[test]
    fn test_identity_is_variant_sensitive() {
        assert_ne!(CallSite::function("idle"), CallSite::Synthetic("idle".to_string()));
    }
}
