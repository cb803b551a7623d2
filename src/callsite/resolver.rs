//! Symbol resolution for address call sites.

use std::collections::HashMap;

use super::format_address;

/// Turns an address into a symbol name
///
/// **Public** - implemented per trace; the core never resolves on its own
pub trait SymbolResolver: Send + Sync {
    /// Look up the name of an address, `None` when unknown
    fn resolve(&self, address: u64) -> Option<String>;
}

/// Resolver that knows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl SymbolResolver for NoResolver {
    fn resolve(&self, _address: u64) -> Option<String> {
        None
    }
}

/// Address to name table, typically loaded with an interval dump
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<u64, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u64, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<(u64, String)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, address: u64) -> Option<String> {
        self.symbols.get(&address).cloned()
    }
}

/// Asks several resolvers in turn
///
/// **Public** - one resolver per trace taking part in a comparison
///
/// The first answer that is a real name wins. An answer that still looks like
/// an address (`0x…`) is only kept if no later resolver does better.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn SymbolResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resolver: Box<dyn SymbolResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn with(mut self, resolver: impl SymbolResolver + 'static) -> Self {
        self.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl SymbolResolver for ResolverChain {
    fn resolve(&self, address: u64) -> Option<String> {
        let mut fallback = None;
        for resolver in &self.resolvers {
            if let Some(label) = resolver.resolve(address) {
                if !label.starts_with("0x") {
                    return Some(label);
                }
                fallback = Some(label);
            }
        }
        fallback.or_else(|| (!self.resolvers.is_empty()).then(|| format_address(address)))
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HexOnly;

    impl SymbolResolver for HexOnly {
        fn resolve(&self, address: u64) -> Option<String> {
            Some(format!("0x{:x}", address))
        }
    }

    #[test]
    fn test_chain_prefers_real_name_over_hex() {
        let mut table = SymbolTable::new();
        table.insert(0x10, "compute");
        let chain = ResolverChain::new().with(HexOnly).with(table);
        assert_eq!(chain.resolve(0x10), Some("compute".to_string()));
    }

    #[test]
    fn test_chain_keeps_hex_when_nothing_better() {
        let chain = ResolverChain::new().with(HexOnly).with(SymbolTable::new());
        assert_eq!(chain.resolve(0x20), Some("0x20".to_string()));
    }

    #[test]
    fn test_empty_chain_resolves_nothing() {
        assert_eq!(ResolverChain::new().resolve(0x20), None);
    }
}
