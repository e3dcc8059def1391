//! Business logic services for BarStockWise

pub mod credit;
pub mod inventory;
pub mod kitchen;
pub mod notification;
pub mod product;
pub mod sale;
pub mod table;

pub use credit::CreditService;
pub use inventory::InventoryService;
pub use kitchen::KitchenService;
pub use notification::NotificationService;
pub use product::ProductService;
pub use sale::SaleService;
pub use table::TableService;
