// src/descriptor/registry.rs
//! Registry of known capture sources

use super::{Descriptor, Shape};
use crate::error::Result;
use tracing::debug;

const BINANCE_COLUMNS: [&str; 8] = [
    "price",
    "size",
    "raw_size",
    "mean_price",
    "change_counter",
    "total_change_counter",
    "size_std",
    "aggregate_count",
];

const BITFINEX_COLUMNS: [&str; 3] = ["price", "count", "amount"];

/// Ordered, closed set of descriptors
///
/// Registration order is the order in which descriptors claim files during
/// discovery.
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: Vec<Descriptor>,
}

impl DescriptorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin order-book sources
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_builtins()?;
        Ok(registry)
    }

    fn register_builtins(&mut self) -> Result<()> {
        let binance = Descriptor::new(
            "Binance",
            Shape::leading_variable(&[128 * 2, BINANCE_COLUMNS.len() as u64])?,
            BINANCE_COLUMNS,
        );
        let binance_futures = binance.with_name("BinanceFutures");

        self.register(binance);
        self.register(binance_futures);
        self.register(Descriptor::new(
            "Bitfinex",
            Shape::leading_variable(&[25 * 2, BITFINEX_COLUMNS.len() as u64])?,
            BITFINEX_COLUMNS,
        ));
        self.register(Descriptor::new(
            "BitfinexP0",
            Shape::leading_variable(&[250 * 2, BITFINEX_COLUMNS.len() as u64])?,
            BITFINEX_COLUMNS,
        ));
        Ok(())
    }

    /// Add a descriptor unless one with the same name is already registered
    ///
    /// Returns `true` if the descriptor was added.
    pub fn register(&mut self, descriptor: Descriptor) -> bool {
        if self.get(descriptor.name()).is_some() {
            debug!("{} already registered", descriptor);
            return false;
        }
        self.descriptors.push(descriptor);
        true
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Dim;

    #[test]
    fn test_builtins_in_order() {
        let registry = DescriptorRegistry::with_builtins().unwrap();
        let names: Vec<&str> = registry.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Binance", "BinanceFutures", "Bitfinex", "BitfinexP0"]);
    }

    #[test]
    fn test_builtin_shapes() {
        let registry = DescriptorRegistry::with_builtins().unwrap();
        assert_eq!(registry.get("Binance").unwrap().compute_shape(2), vec![2, 256, 8]);
        assert_eq!(registry.get("BinanceFutures").unwrap().compute_shape(2), vec![2, 256, 8]);
        assert_eq!(registry.get("Bitfinex").unwrap().compute_shape(1), vec![1, 50, 3]);
        assert_eq!(registry.get("BitfinexP0").unwrap().compute_shape(1), vec![1, 500, 3]);
    }

    #[test]
    fn test_builtin_columns_name_the_last_dimension() {
        let registry = DescriptorRegistry::with_builtins().unwrap();
        for descriptor in registry.iter() {
            let last = descriptor.shape().dims().last().copied();
            assert_eq!(
                last,
                Some(Dim::Fixed(descriptor.columns().len() as u64)),
                "{}",
                descriptor
            );
        }
        assert_eq!(
            registry.get("Bitfinex").unwrap().columns(),
            ["price", "count", "amount"]
        );
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = DescriptorRegistry::with_builtins().unwrap();
        let count = registry.len();

        let again = registry.get("Binance").unwrap().clone();
        assert!(!registry.register(again));
        assert_eq!(registry.len(), count);

        let custom = registry.get("Bitfinex").unwrap().with_name("Kraken");
        assert!(registry.register(custom));
        assert_eq!(registry.len(), count + 1);
        assert!(registry.get("Kraken").is_some());
    }

    #[test]
    fn test_empty_registry() {
        let registry = DescriptorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("Binance").is_none());
    }
}
