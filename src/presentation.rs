//! Presentation boundary: notifications, the item menu, and icon attachment.

use crate::feed::types::Item;
use std::collections::HashMap;

/// How long a notification stays on screen.
pub const NOTIFICATION_TIMEOUT_MS: u64 = 10_000;

/// Receives each cycle's items and late-arriving icons.
pub trait PresentationSink: Send {
    /// Show a user-visible notification for a new or updated item.
    fn announce(&mut self, item: &Item);
    /// Replace the menu with this cycle's working set.
    fn populate_menu(&mut self, items: Vec<Item>);
    /// Attach an icon to whichever slot currently holds `identifier`.
    /// Returns false (and changes nothing) when no such slot exists.
    fn attach_icon(&mut self, identifier: &str, image: Vec<u8>) -> bool;
}

#[derive(Debug, Clone)]
pub struct MenuSlot {
    pub item: Item,
    pub icon: Option<Vec<u8>>,
}

/// Menu entries in display order, resolvable by identifier.
#[derive(Debug, Default)]
pub struct MenuModel {
    slots: Vec<MenuSlot>,
    index: HashMap<String, usize>,
}

impl MenuModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, items: Vec<Item>) {
        self.index.clear();
        self.slots.clear();
        for item in items {
            // First occurrence wins if the feed repeats an identifier
            if self.index.contains_key(&item.identifier) {
                continue;
            }
            self.index.insert(item.identifier.clone(), self.slots.len());
            self.slots.push(MenuSlot { item, icon: None });
        }
    }

    pub fn attach(&mut self, identifier: &str, image: Vec<u8>) -> bool {
        match self.index.get(identifier) {
            Some(&i) => {
                self.slots[i].icon = Some(image);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&MenuSlot> {
        self.index.get(identifier).map(|&i| &self.slots[i])
    }

    pub fn slots(&self) -> &[MenuSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Headless sink: notifications go to the log, the menu is kept in memory.
#[derive(Debug, Default)]
pub struct LogSink {
    menu: MenuModel,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn menu(&self) -> &MenuModel {
        &self.menu
    }
}

impl PresentationSink for LogSink {
    fn announce(&mut self, item: &Item) {
        tracing::info!(
            owner = %item.owner,
            url = %item.content_url,
            timeout_ms = NOTIFICATION_TIMEOUT_MS,
            "{}: {}",
            item.title,
            item.description
        );
    }

    fn populate_menu(&mut self, items: Vec<Item>) {
        tracing::debug!(count = items.len(), "menu repopulated");
        self.menu.replace(items);
    }

    fn attach_icon(&mut self, identifier: &str, image: Vec<u8>) -> bool {
        let attached = self.menu.attach(identifier, image);
        if !attached {
            tracing::debug!(identifier, "icon arrived for an item no longer in the menu");
        }
        attached
    }
}
