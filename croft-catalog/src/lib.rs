pub mod inventory;

pub use inventory::{InventoryCoordinator, InventoryStore, ProductInventory, ReservationLine};
