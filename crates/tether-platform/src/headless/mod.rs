// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Headless platform: an in-memory toolkit on a dedicated UI thread.
//
// Used on desktop and CI, where there is no native main loop. Views are plain
// Rust objects, so tests can drive user interaction and inspect results.

mod factories;
mod style;
mod view;

use std::sync::Arc;

use tether_core::error::Result;
use tether_runtime::{FactorySet, Platform, StyleTranslator, UiPoster, UiThread};

pub use factories::{
    ContainerFactory, HeadlessStats, ImageFactory, InputFactory, ListFactory, TextFactory,
    headless_factories,
};
pub use style::HeadlessStyle;
pub use view::{HeadlessView, NativeListener};

/// Name of the UI thread each headless runtime spawns.
pub const UI_THREAD_NAME: &str = "tether-ui";

#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    stats: Arc<HeadlessStats>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Teardown counters for every view this platform's factories created.
    pub fn stats(&self) -> &HeadlessStats {
        &self.stats
    }
}

impl Platform for HeadlessPlatform {
    type View = HeadlessView;

    fn name(&self) -> &str {
        "headless"
    }

    fn ui_poster(&self) -> Result<Arc<dyn UiPoster>> {
        let thread: Arc<dyn UiPoster> = UiThread::spawn(UI_THREAD_NAME)?;
        Ok(thread)
    }

    fn factories(&self) -> FactorySet<HeadlessView> {
        headless_factories(&self.stats)
    }

    fn style(&self) -> Arc<dyn StyleTranslator<HeadlessView>> {
        Arc::new(HeadlessStyle)
    }
}
