//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod cycle;
pub mod payment;
pub mod record;
pub mod system_state;

// Re-export specific types to avoid conflicts
pub use cycle::{Column as CycleColumn, Entity as Cycle, Model as CycleModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use record::{Column as RecordColumn, Entity as Record, Model as RecordModel, RecordKind};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
