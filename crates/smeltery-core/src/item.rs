//! Item identity, stacks, furnace slots and the item provider seam.
//!
//! The core never decides what an item *is*. Stacks carry an opaque
//! `(kind, id, amount)` triple and every identity question goes through an
//! [`ItemProvider`] registered in [`ItemProviders`] once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Kind name of the built-in provider.
pub const VANILLA: &str = "vanilla";

/// Reference to an item: the provider kind plus the provider's item id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: String,
    pub id: String,
}

impl ItemRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn vanilla(id: impl Into<String>) -> Self {
        Self::new(VANILLA, id)
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A stack of identical items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemRef,
    pub amount: u32,
}

impl ItemStack {
    pub fn new(item: ItemRef, amount: u32) -> Self {
        Self { item, amount }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Resolves item identity for one item kind (vanilla items, or a third-party
/// item plugin). Implementations must be pure: same inputs, same answer.
pub trait ItemProvider: Send + Sync {
    /// The kind name stacks produced by this provider carry.
    fn kind(&self) -> &str;

    /// Construct a stack of `amount` items with the given provider id.
    fn get_item(&self, id: &str, amount: u32) -> Option<ItemStack>;

    /// Whether `stack` is the provider item `id`.
    fn matches(&self, stack: &ItemStack, id: &str) -> bool;
}

/// Built-in provider for plain game items. Ids compare case-insensitively
/// and are stored upper-case.
#[derive(Debug, Clone, Copy, Default)]
pub struct VanillaItems;

impl ItemProvider for VanillaItems {
    fn kind(&self) -> &str {
        VANILLA
    }

    fn get_item(&self, id: &str, amount: u32) -> Option<ItemStack> {
        if id.is_empty() || amount == 0 {
            return None;
        }
        Some(ItemStack::new(
            ItemRef::vanilla(id.to_ascii_uppercase()),
            amount,
        ))
    }

    fn matches(&self, stack: &ItemStack, id: &str) -> bool {
        stack.item.kind == VANILLA && stack.item.id.eq_ignore_ascii_case(id)
    }
}

/// Registry of item providers keyed by kind. Built once at startup and
/// shared read-only (behind an `Arc`) with the stepper and the workers.
#[derive(Clone, Default)]
pub struct ItemProviders {
    providers: HashMap<String, Arc<dyn ItemProvider>>,
}

impl fmt::Debug for ItemProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.providers.keys().collect();
        kinds.sort();
        f.debug_struct("ItemProviders").field("kinds", &kinds).finish()
    }
}

impl ItemProviders {
    /// An empty registry. Nothing matches until a provider is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry containing only [`VanillaItems`].
    pub fn with_vanilla() -> Self {
        let mut providers = Self::new();
        providers.register(Arc::new(VanillaItems));
        providers
    }

    /// Register a provider under its kind. Returns the provider it replaced.
    pub fn register(&mut self, provider: Arc<dyn ItemProvider>) -> Option<Arc<dyn ItemProvider>> {
        self.providers.insert(provider.kind().to_string(), provider)
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    pub fn get_item(&self, kind: &str, id: &str, amount: u32) -> Option<ItemStack> {
        self.providers.get(kind)?.get_item(id, amount)
    }

    pub fn matches(&self, stack: &ItemStack, kind: &str, id: &str) -> bool {
        self.providers
            .get(kind)
            .is_some_and(|p| p.matches(stack, id))
    }

    pub fn matches_ref(&self, stack: &ItemStack, item: &ItemRef) -> bool {
        self.matches(stack, &item.kind, &item.id)
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Sum the amounts of every non-empty slot matching `item`.
pub fn count_matching(slots: &[Option<ItemStack>], item: &ItemRef, providers: &ItemProviders) -> u32 {
    slots
        .iter()
        .flatten()
        .filter(|s| providers.matches_ref(s, item))
        .fold(0u32, |acc, s| acc.saturating_add(s.amount))
}

/// Remove up to `amount` matching items from the slots, first slot first.
/// Slots that reach zero are emptied. Returns the amount actually removed.
pub fn take_matching(
    slots: &mut [Option<ItemStack>],
    item: &ItemRef,
    amount: u32,
    providers: &ItemProviders,
) -> u32 {
    let mut remaining = amount;
    for slot in slots.iter_mut() {
        if remaining == 0 {
            break;
        }
        let Some(stack) = slot else {
            continue;
        };
        if !providers.matches_ref(stack, item) {
            continue;
        }
        let taken = remaining.min(stack.amount);
        stack.amount -= taken;
        remaining -= taken;
        if stack.amount == 0 {
            *slot = None;
        }
    }
    amount - remaining
}

/// The output slot of a furnace: one or more stacks up to a total capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub stacks: Vec<ItemStack>,
    pub capacity: u32,
}

impl OutputSlot {
    pub fn new(capacity: u32) -> Self {
        Self {
            stacks: Vec::new(),
            capacity,
        }
    }

    /// Add a stack, merging with an existing stack of the same item.
    /// Returns the amount that didn't fit.
    #[must_use = "overflow count indicates items that did not fit"]
    pub fn add(&mut self, stack: ItemStack) -> u32 {
        let space = self.capacity.saturating_sub(self.total());
        let to_add = stack.amount.min(space);
        let overflow = stack.amount - to_add;

        if to_add > 0 {
            if let Some(existing) = self.stacks.iter_mut().find(|s| s.item == stack.item) {
                existing.amount += to_add;
            } else {
                self.stacks.push(ItemStack::new(stack.item, to_add));
            }
        }

        overflow
    }

    /// Remove items of one kind. Returns the amount actually removed.
    #[must_use = "returns the quantity actually removed, which may be less than requested"]
    pub fn take(&mut self, item: &ItemRef, amount: u32) -> u32 {
        let Some(stack) = self.stacks.iter_mut().find(|s| &s.item == item) else {
            return 0;
        };
        let removed = amount.min(stack.amount);
        stack.amount -= removed;
        self.stacks.retain(|s| s.amount > 0);
        removed
    }

    /// Remove and return everything in the slot.
    pub fn take_all(&mut self) -> Vec<ItemStack> {
        std::mem::take(&mut self.stacks)
    }

    pub fn quantity(&self, item: &ItemRef) -> u32 {
        self.stacks
            .iter()
            .find(|s| &s.item == item)
            .map(|s| s.amount)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.stacks.iter().fold(0u32, |acc, s| acc.saturating_add(s.amount))
    }

    pub fn has_space_for(&self, quantity: u32) -> bool {
        self.total().saturating_add(quantity) <= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
