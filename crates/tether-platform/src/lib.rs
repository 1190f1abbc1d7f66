// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Platform implementations for the Tether runtime.
//!
//! Each platform supplies its UI thread poster, its component factories and
//! its style translator. iOS uses UIKit through `objc2`, Android uses the
//! view system through JNI, and everything else gets the in-memory headless
//! toolkit so desktop and CI builds run the same runtime.

pub mod color;
pub mod headless;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

use tether_core::error::Result;

#[cfg(target_os = "ios")]
pub type NativePlatform = ios::IosPlatform;

#[cfg(target_os = "android")]
pub type NativePlatform = android::AndroidPlatform;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub type NativePlatform = headless::HeadlessPlatform;

/// The platform for the target operating system.
pub fn native_platform() -> Result<NativePlatform> {
    #[cfg(target_os = "ios")]
    {
        ios::IosPlatform::new()
    }
    #[cfg(target_os = "android")]
    {
        android::AndroidPlatform::new()
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        Ok(headless::HeadlessPlatform::new())
    }
}
