//! Workspace facade crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-playback`, `core-runtime`, `bridge-desktop`).
//! Host applications can depend on `mp3-stream-workspace` and enable the
//! documented features without needing to wire each crate individually.

pub use core_playback as playback;
pub use core_runtime as runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
