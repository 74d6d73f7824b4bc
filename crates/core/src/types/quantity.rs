//! Line quantities and free-text quantity input.
//!
//! A [`Quantity`] is always at least one, so pricing code never sees a zero or
//! negative count. Text typed into a quantity field is interpreted by
//! [`QuantityInput`], which distinguishes "still editing" from "field lost
//! focus".

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// A positive item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// One unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity; `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// The count as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Sum two quantities, saturating at `u32::MAX`.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0.get()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("quantity must be at least 1")
    }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self {
        q.get()
    }
}

/// What a quantity edit should do to a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityEdit {
    /// Set the line to this quantity.
    Set(Quantity),
    /// The user asked for zero or fewer: drop the line.
    Remove,
    /// The text is not a number yet; leave the line untouched.
    Defer,
}

/// Interpreter for raw text from a quantity field.
pub struct QuantityInput;

impl QuantityInput {
    /// Interpret text while the field still has focus.
    ///
    /// Empty or non-numeric text is deferred so a user can clear the field
    /// and type a new value without the line flickering.
    #[must_use]
    pub fn on_change(text: &str) -> QuantityEdit {
        match text.trim().parse::<i64>() {
            Ok(n) if n <= 0 => QuantityEdit::Remove,
            Ok(n) => u32::try_from(n)
                .ok()
                .and_then(Quantity::new)
                .map_or(QuantityEdit::Defer, QuantityEdit::Set),
            Err(_) => QuantityEdit::Defer,
        }
    }

    /// Interpret text when the field loses focus.
    ///
    /// Anything still not a usable number reverts to one unit.
    #[must_use]
    pub fn on_commit(text: &str) -> QuantityEdit {
        match Self::on_change(text) {
            QuantityEdit::Defer => QuantityEdit::Set(Quantity::ONE),
            edit => edit,
        }
    }
}
