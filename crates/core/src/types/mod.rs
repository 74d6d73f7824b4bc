//! Core value types for Tierline.
//!
//! Type-safe wrappers for ids, money, email addresses, quantities and
//! statuses.

pub mod email;
pub mod id;
pub mod money;
pub mod quantity;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError};
pub use quantity::{Quantity, QuantityEdit, QuantityInput};
pub use status::*;
