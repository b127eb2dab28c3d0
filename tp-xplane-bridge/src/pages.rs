//! Page scope controller (C8): tracks how many Touch Portal surfaces
//! currently show each page and (un)subscribes the page's datarefs at the
//! simulator on the 0→1 / 1→0 usage transitions.
//!
//! Grounded on the Python plugin's `entering_page`/`leaving_page` plus
//! `add_datarefs_to_monitor`/`remove_datarefs_to_monitor`: Touch Portal can
//! show the same page on more than one button surface at once, so a page
//! isn't actually left until its last viewer leaves.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bridge_model::{DatarefRegistry, Result, TPState, TpSink};
use tracing::debug;

use crate::subscriptions::{SubscriptionMultiplexer, DEFAULT_REQ_FREQUENCY};

struct Inner {
    pages: HashMap<String, Vec<Arc<TPState>>>,
    usage: HashMap<String, u32>,
}

/// Owns the page→states table built at init/reinit and drives subscription
/// refcounting as pages are shown and hidden.
pub struct PageScopeController {
    inner: Mutex<Inner>,
    subscriptions: Arc<SubscriptionMultiplexer>,
    target: Mutex<Option<SocketAddr>>,
}

impl PageScopeController {
    pub fn new(subscriptions: Arc<SubscriptionMultiplexer>) -> Self {
        Self {
            inner: Mutex::new(Inner { pages: HashMap::new(), usage: HashMap::new() }),
            subscriptions,
            target: Mutex::new(None),
        }
    }

    pub fn set_target(&self, target: SocketAddr) {
        *self.target.lock().unwrap() = Some(target);
    }

    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.lock().unwrap()
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.subscriptions
    }

    /// Replace the page table wholesale (used by init/reinit). Does not
    /// touch usage counts or active subscriptions — callers force-unload
    /// every page first if that's needed.
    pub fn set_pages(&self, pages: HashMap<String, Vec<Arc<TPState>>>) {
        self.inner.lock().unwrap().pages = pages;
    }

    pub fn page_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().pages.keys().cloned().collect()
    }

    pub fn active_pages(&self) -> Vec<String> {
        self.inner.lock().unwrap().usage.keys().cloned().collect()
    }

    fn dataref_paths_for(&self, page: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .pages
            .get(page)
            .map(|states| states.iter().flat_map(|s| s.dataref_paths().to_vec()).collect())
            .unwrap_or_default()
    }

    /// A Touch Portal surface now shows `page`. On the 0→1 transition,
    /// subscribe to every dataref the page's states reference.
    pub fn entering_page(&self, page: &str) -> Result<()> {
        let first_viewer = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.pages.contains_key(page) {
                debug!(page, "entering unknown page, ignoring");
                return Ok(());
            }
            let count = inner.usage.entry(page.to_string()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first_viewer {
            self.add_datarefs_to_monitor(page)?;
        }
        Ok(())
    }

    /// A Touch Portal surface no longer shows `page`. On the 1→0
    /// transition, unsubscribe from every dataref the page's states
    /// reference (unless some other page still needs it).
    pub fn leaving_page(&self, page: &str) -> Result<()> {
        let last_viewer = {
            let mut inner = self.inner.lock().unwrap();
            match inner.usage.get_mut(page) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    inner.usage.remove(page);
                    true
                }
                None => return Ok(()),
            }
        };

        if last_viewer {
            self.remove_datarefs_to_monitor(page)?;
        }
        Ok(())
    }

    fn add_datarefs_to_monitor(&self, page: &str) -> Result<()> {
        let Some(target) = *self.target.lock().unwrap() else {
            debug!(page, "no simulator target yet, deferring subscription");
            return Ok(());
        };
        for path in self.dataref_paths_for(page) {
            if self.subscriptions.add_reference(&path) {
                self.subscriptions.subscribe(target, &path, DEFAULT_REQ_FREQUENCY)?;
            }
        }
        Ok(())
    }

    fn remove_datarefs_to_monitor(&self, page: &str) -> Result<()> {
        let Some(target) = *self.target.lock().unwrap() else {
            return Ok(());
        };
        for path in self.dataref_paths_for(page) {
            if self.subscriptions.remove_reference(&path) {
                self.subscriptions.subscribe(target, &path, 0)?;
            }
        }
        Ok(())
    }

    /// Force every currently-active page closed, as if every viewer left at
    /// once. Used by the lifecycle coordinator before a reinit/terminate.
    pub fn unload_all(&self) -> Result<()> {
        let active: Vec<String> = self.inner.lock().unwrap().usage.keys().cloned().collect();
        for page in active {
            loop {
                let still_active = self.inner.lock().unwrap().usage.contains_key(&page);
                if !still_active {
                    break;
                }
                self.leaving_page(&page)?;
            }
        }
        Ok(())
    }
}
