use rustc_hash::FxHashMap;

use crate::selector::SelectorKey;

/// Identity key for a registered callback: the address of its `Rc`
/// allocation. Clones of one `Rc` share a key; separately allocated closures
/// never collide, even with identical bodies.
pub(crate) type CallbackKey = usize;

/// Per-scope bookkeeping: selector key -> (callback identity -> handle).
///
/// Pure structural mutation; nothing in here touches subscriptions or
/// timers. Removal methods hand the removed handles back so the caller can
/// decide whether to cancel them, and can do so after the map borrow is
/// released - a cancellation that re-enters the map must observe no held
/// borrow and no half-removed state.
pub(crate) struct WaiterMap<H> {
    map: FxHashMap<SelectorKey, FxHashMap<CallbackKey, H>>,
}

impl<H> Default for WaiterMap<H> {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

impl<H> WaiterMap<H> {
    /// Insert the entry for `(selector, callback)`, returning the handle it
    /// displaced, if any.
    pub fn add(&mut self, selector: SelectorKey, callback: CallbackKey, handle: H) -> Option<H> {
        self.map.entry(selector).or_default().insert(callback, handle)
    }

    pub fn get(&self, selector: &SelectorKey, callback: CallbackKey) -> Option<&H> {
        self.map.get(selector)?.get(&callback)
    }

    /// All handles registered for `selector`.
    pub fn all<'a>(&'a self, selector: &SelectorKey) -> impl Iterator<Item = &'a H> + 'a {
        self.map
            .get(selector)
            .into_iter()
            .flat_map(|entries| entries.values())
    }

    /// Remove one entry. Absent entries are a silent no-op.
    pub fn remove(&mut self, selector: &SelectorKey, callback: CallbackKey) -> Option<H> {
        let entries = self.map.get_mut(selector)?;
        let handle = entries.remove(&callback);
        if entries.is_empty() {
            self.map.remove(selector);
        }
        handle
    }

    /// Remove every entry for `selector`, returning the handles in one
    /// snapshot.
    pub fn remove_all(&mut self, selector: &SelectorKey) -> Vec<H> {
        self.map
            .remove(selector)
            .map(|entries| entries.into_values().collect())
            .unwrap_or_default()
    }

    /// Empty the whole map, returning every handle.
    pub fn drain(&mut self) -> Vec<H> {
        self.map
            .drain()
            .flat_map(|(_, entries)| entries.into_values())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.values().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
