//! Input ordering for selection groups
//!
//! A group keeps its members sorted best-first under an [`InputComparator`].
//! The comparator must be a total order; ties between distinct outputs are
//! broken by outpoint so the resulting order never depends on scan order.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::types::UnspentOutput;

type CompareFn = dyn Fn(&UnspentOutput, &UnspentOutput) -> Ordering + Send + Sync;

/// Shared total order over unspent outputs, best candidate first
#[derive(Clone)]
pub struct InputComparator {
    name: &'static str,
    cmp: Arc<CompareFn>,
}

impl InputComparator {
    /// Largest value first
    pub fn prefer_biggest() -> Self {
        Self {
            name: "prefer_biggest",
            cmp: Arc::new(prefer_biggest),
        }
    }

    /// Lowest confirmed height first; unconfirmed outputs last
    pub fn prefer_oldest() -> Self {
        Self {
            name: "prefer_oldest",
            cmp: Arc::new(prefer_oldest),
        }
    }

    /// Wrap a caller supplied ordering
    pub fn custom<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&UnspentOutput, &UnspentOutput) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name,
            cmp: Arc::new(f),
        }
    }

    /// Compare two outputs, falling back to outpoint order on ties
    pub fn compare(&self, a: &UnspentOutput, b: &UnspentOutput) -> Ordering {
        (self.cmp)(a, b).then_with(|| outpoint_order(a, b))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for InputComparator {
    fn default() -> Self {
        Self::prefer_biggest()
    }
}

impl fmt::Debug for InputComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputComparator").field(&self.name).finish()
    }
}

/// Stable identifier order: txid bytes, then output index
pub fn outpoint_order(a: &UnspentOutput, b: &UnspentOutput) -> Ordering {
    a.outpoint.cmp(&b.outpoint)
}

pub fn prefer_biggest(a: &UnspentOutput, b: &UnspentOutput) -> Ordering {
    b.value.cmp(&a.value).then_with(|| outpoint_order(a, b))
}

pub fn prefer_oldest(a: &UnspentOutput, b: &UnspentOutput) -> Ordering {
    let by_height = match (a.height, b.height) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_height.then_with(|| prefer_biggest(a, b))
}
