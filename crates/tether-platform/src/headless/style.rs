// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference style translator for the headless toolkit.

use serde_json::Value;
use tracing::trace;

use tether_core::error::{Result, TetherError};
use tether_runtime::StyleTranslator;

use crate::color::parse_color;

use super::view::HeadlessView;

const COLOR_KEYS: &[&str] = &["backgroundColor", "color", "borderColor", "tintColor"];

const LENGTH_KEYS: &[&str] = &[
    "width",
    "height",
    "margin",
    "padding",
    "borderWidth",
    "borderRadius",
    "fontSize",
    "flex",
];

/// Validates and records the style keys it knows; ignores the rest.
#[derive(Debug, Default)]
pub struct HeadlessStyle;

impl StyleTranslator<HeadlessView> for HeadlessStyle {
    fn apply_style(&self, key: &str, value: &Value, view: &HeadlessView) -> Result<()> {
        if value.is_null() {
            // null resets to the toolkit default.
            view.clear_style(key);
            return Ok(());
        }

        if COLOR_KEYS.contains(&key) {
            let c = parse_color(value)?;
            view.set_style(key, Value::from(format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)));
        } else if LENGTH_KEYS.contains(&key) {
            if !value.is_number() {
                return Err(TetherError::InvalidArguments(format!("{key} must be a number")));
            }
            view.set_style(key, value.clone());
        } else if key == "opacity" {
            let alpha = value
                .as_f64()
                .filter(|a| (0.0..=1.0).contains(a))
                .ok_or_else(|| TetherError::InvalidArguments("opacity must be within 0..=1".into()))?;
            view.set_style(key, Value::from(alpha));
        } else {
            trace!(key, "style key ignored");
        }
        Ok(())
    }
}
