use async_trait::async_trait;
use croft_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Stock counters for one product.
///
/// Invariant: `0 <= reserved_quantity <= quantity` at all times, enforced by
/// the store under concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInventory {
    pub product_id: Uuid,
    pub quantity: i64,
    pub reserved_quantity: i64,
}

impl ProductInventory {
    pub fn available_quantity(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }
}

/// One product/quantity pair inside a reservation or release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReservationLine {
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Persistence seam for inventory counters.
///
/// `reserve` must be atomic with respect to concurrent callers for the same
/// product: the check against available quantity and the counter bump happen
/// as one compare-and-swap, so the sum of reservations never exceeds stock.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, product_id: Uuid) -> Result<Option<ProductInventory>>;

    async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<()>;

    /// Decrement the reservation, clamped at zero.
    async fn release(&self, product_id: Uuid, quantity: i64) -> Result<()>;
}

/// Reserves and releases stock on behalf of the order lifecycle.
///
/// A reservation is a soft hold: it is converted into a permanent deduction
/// when the order is delivered, or released on cancellation and
/// refund-driven rollback.
pub struct InventoryCoordinator {
    store: Arc<dyn InventoryStore>,
}

impl InventoryCoordinator {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    pub async fn availability(&self, product_id: Uuid) -> Result<ProductInventory> {
        self.store
            .get(product_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))
    }

    /// Place a soft hold on `quantity` units of a product.
    pub async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(Error::validation("Invalid quantity"));
        }
        self.store.reserve(product_id, quantity).await?;
        tracing::debug!(%product_id, quantity, "inventory reserved");
        Ok(())
    }

    /// Release a previously placed hold. Clamped at zero in the store, so a
    /// double release cannot drive the counter negative.
    pub async fn release(&self, product_id: Uuid, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(Error::validation("Invalid quantity"));
        }
        self.store.release(product_id, quantity).await?;
        tracing::debug!(%product_id, quantity, "inventory released");
        Ok(())
    }

    /// Release every line of an order's reservation.
    pub async fn release_all(&self, lines: &[ReservationLine]) -> Result<()> {
        for line in lines {
            self.release(line.product_id, line.quantity).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mutex-guarded map standing in for the database; the lock plays the
    /// role of the row-level lock.
    struct MemoryInventory {
        items: Mutex<HashMap<Uuid, ProductInventory>>,
    }

    impl MemoryInventory {
        fn with_stock(product_id: Uuid, quantity: i64) -> Self {
            let mut items = HashMap::new();
            items.insert(
                product_id,
                ProductInventory {
                    product_id,
                    quantity,
                    reserved_quantity: 0,
                },
            );
            Self {
                items: Mutex::new(items),
            }
        }
    }

    #[async_trait]
    impl InventoryStore for MemoryInventory {
        async fn get(&self, product_id: Uuid) -> Result<Option<ProductInventory>> {
            Ok(self.items.lock().unwrap().get(&product_id).cloned())
        }

        async fn reserve(&self, product_id: Uuid, quantity: i64) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(&product_id)
                .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))?;
            if item.available_quantity() < quantity {
                return Err(Error::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: item.available_quantity(),
                });
            }
            item.reserved_quantity += quantity;
            Ok(())
        }

        async fn release(&self, product_id: Uuid, quantity: i64) -> Result<()> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(&product_id)
                .ok_or_else(|| Error::not_found(format!("Product not found: {}", product_id)))?;
            item.reserved_quantity = (item.reserved_quantity - quantity).max(0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reserve_and_release_roundtrip() {
        let product_id = Uuid::new_v4();
        let coordinator =
            InventoryCoordinator::new(Arc::new(MemoryInventory::with_stock(product_id, 10)));

        coordinator.reserve(product_id, 4).await.unwrap();
        let inv = coordinator.availability(product_id).await.unwrap();
        assert_eq!(inv.reserved_quantity, 4);
        assert_eq!(inv.available_quantity(), 6);

        coordinator.release(product_id, 4).await.unwrap();
        let inv = coordinator.availability(product_id).await.unwrap();
        assert_eq!(inv.reserved_quantity, 0);
        assert_eq!(inv.available_quantity(), 10);
    }

    #[tokio::test]
    async fn test_reserve_fails_when_stock_is_short() {
        let product_id = Uuid::new_v4();
        let coordinator =
            InventoryCoordinator::new(Arc::new(MemoryInventory::with_stock(product_id, 3)));

        let err = coordinator.reserve(product_id, 5).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientStock { available: 3, .. }));

        // Nothing was held back.
        let inv = coordinator.availability(product_id).await.unwrap();
        assert_eq!(inv.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_non_positive_quantity_rejected() {
        let product_id = Uuid::new_v4();
        let coordinator =
            InventoryCoordinator::new(Arc::new(MemoryInventory::with_stock(product_id, 3)));

        let err = coordinator.reserve(product_id, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid quantity");
    }

    #[tokio::test]
    async fn test_release_is_clamped_at_zero() {
        let product_id = Uuid::new_v4();
        let coordinator =
            InventoryCoordinator::new(Arc::new(MemoryInventory::with_stock(product_id, 10)));

        coordinator.reserve(product_id, 2).await.unwrap();
        coordinator.release(product_id, 5).await.unwrap();

        let inv = coordinator.availability(product_id).await.unwrap();
        assert_eq!(inv.reserved_quantity, 0);
        assert_eq!(inv.quantity, 10);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let product_id = Uuid::new_v4();
        let coordinator = Arc::new(InventoryCoordinator::new(Arc::new(
            MemoryInventory::with_stock(product_id, 10),
        )));

        // 20 callers race for 10 units, one unit each.
        let mut handles = Vec::new();
        for _ in 0..20 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.reserve(product_id, 1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        let inv = coordinator.availability(product_id).await.unwrap();
        assert_eq!(inv.reserved_quantity, 10);
        assert_eq!(inv.available_quantity(), 0);
    }
}
