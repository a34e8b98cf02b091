// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-scoped cache invalidation keyed by group name.
//!
//! Several objects may cache reads of the same underlying group within one logical transaction.
//! Every write broadcasts an invalidation for the group name so that all holders, not only the
//! writer, re-read the store on next access.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

/// Something holding cached state derived from the group store.
pub trait Invalidate {
    fn invalidate(&self);
}

impl<T> Invalidate for RefCell<Option<T>> {
    fn invalidate(&self) {
        self.borrow_mut().take();
    }
}

type Holders = Vec<(u64, Weak<dyn Invalidate>)>;

#[derive(Default)]
struct BusInner {
    holders: HashMap<String, Holders>,
    next_id: u64,
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner")
            .field("groups", &self.holders.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Registry of cache holders per group name.
///
/// Cloned handles share the same registry.
#[derive(Clone, Debug, Default)]
pub struct InvalidationBus {
    inner: Rc<RefCell<BusInner>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache holder for a group name.
    ///
    /// The holder stays registered until the returned guard is dropped.
    pub fn subscribe<H>(&self, name: &str, holder: &Rc<H>) -> Subscription
    where
        H: Invalidate + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let holder: Rc<dyn Invalidate> = holder.clone();
        inner
            .holders
            .entry(name.to_owned())
            .or_default()
            .push((id, Rc::downgrade(&holder)));
        Subscription {
            bus: Rc::downgrade(&self.inner),
            name: name.to_owned(),
            id,
        }
    }

    /// Clear the caches of every live holder registered for this group name.
    pub fn invalidate(&self, name: &str) {
        // Collect first so holders are free to touch the bus while invalidating.
        let targets: Vec<Rc<dyn Invalidate>> = match self.inner.borrow().holders.get(name) {
            Some(holders) => holders.iter().filter_map(|(_, weak)| weak.upgrade()).collect(),
            None => return,
        };
        trace!(name, holders = targets.len(), "invalidate group caches");
        for target in targets {
            target.invalidate();
        }
    }

    /// Clear every cache and forget holders which are gone, used at the start of a transaction.
    pub fn clear(&self) {
        let targets: Vec<Rc<dyn Invalidate>> = {
            let mut inner = self.inner.borrow_mut();
            inner.holders.retain(|_, holders| {
                holders.retain(|(_, weak)| weak.strong_count() > 0);
                !holders.is_empty()
            });
            inner
                .holders
                .values()
                .flat_map(|holders| holders.iter().filter_map(|(_, weak)| weak.upgrade()))
                .collect()
        };
        trace!(holders = targets.len(), "clear all group caches");
        for target in targets {
            target.invalidate();
        }
    }

    /// Number of holders registered for a group name.
    pub fn subscribers(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .holders
            .get(name)
            .map_or(0, |holders| holders.len())
    }

    fn unsubscribe(inner: &RefCell<BusInner>, name: &str, id: u64) {
        let mut inner = inner.borrow_mut();
        if let Some(holders) = inner.holders.get_mut(name) {
            holders.retain(|(existing, _)| *existing != id);
            if holders.is_empty() {
                inner.holders.remove(name);
            }
        }
    }
}

/// Guard keeping a cache holder registered on the bus.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<RefCell<BusInner>>,
    name: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            InvalidationBus::unsubscribe(&inner, &self.name, self.id);
        }
    }
}
