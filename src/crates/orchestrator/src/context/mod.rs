//! The byte-budgeted prompt context manager.

pub mod manager;

pub use manager::{
    smart_thin_log, ContextItem, ContextManager, ContextUsage, ItemType, Priority, WarningLevel,
};
