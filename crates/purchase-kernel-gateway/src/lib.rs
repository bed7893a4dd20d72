//! # Purchase Kernel Gateway
//!
//! The narrow interface between the kernel and a third-party store. A
//! store-specific adapter implements [`StoreGateway`]; the kernel never speaks
//! the store's protocol itself.
//!
//! ## Key Types
//!
//! - [`StoreGateway`] - The async trait every store adapter implements
//! - [`GatewayEvent`] - Purchase updates and disconnects pushed by the store
//! - [`ResponseCode`] - The store's billing response codes
//! - [`MemoryGateway`] - In-memory store for tests and demos
//!
//! ## Usage
//!
//! ```rust,no_run
//! use purchase_kernel_core::{Keypair, ProductKind};
//! use purchase_kernel_gateway::{MemoryGateway, StoreGateway};
//! use tokio::sync::mpsc;
//!
//! async fn example() {
//!     let gateway = MemoryGateway::new(Keypair::generate());
//!     let (events, mut rx) = mpsc::unbounded_channel();
//!     gateway.open(events).await.unwrap();
//!
//!     gateway.launch_purchase_flow("gold", ProductKind::OneTime).await.unwrap();
//!     // let event = rx.recv().await;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Codes vs errors**: a negative store answer is a [`ResponseCode`];
//!   only failing to reach the store is a [`GatewayError`]
//! - **Wire tokens**: product type strings stay in [`wire`], used by adapters only

pub mod error;
pub mod memory;
pub mod response;
pub mod traits;
pub mod wire;

pub use error::{GatewayError, Result};
pub use memory::{FlowScript, GatewayStats, MemoryGateway};
pub use response::ResponseCode;
pub use traits::{
    CatalogResponse, GatewayEvent, GatewayEvents, OwnedPurchasesPage, PurchaseUpdate,
    StoreGateway,
};
