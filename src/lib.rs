//! DictCore: custom dictionary highlighting for web pages
//!
//! A Rust/WASM engine that marks user-defined terms on a live page, shows
//! their definitions on hover, and keeps the markup in step with both page
//! mutations and dictionary edits.
//!
//! # Architecture
//!
//! ## Page model
//! - `dom/` - `Document` trait over copyable `NodeId` handles, with the live
//!   page (`web`, wasm32) and an in-memory tree (`VirtualDocument`)
//!
//! ## Data
//! - `dictionary/` - `Dictionary`, the last-write-wins `DictionaryCache` and
//!   the key-value store contract
//! - `policy.rs` - Per-site allowlist and the enabled/disabled state machine
//!
//! ## Highlighting
//! - `highlight/matcher.rs` - Aho-Corasick term matching
//! - `highlight/renderer.rs` - Tree walk that wraps matches
//! - `highlight/reversal.rs` - Unwrapping per term or wholesale
//! - `highlight/coordinator.rs` - Debounced mutation handling
//! - `session.rs` - `HighlightSession`, one per page
//!
//! ## Extension surfaces
//! - `registration.rs` - Context-menu term registration
//! - `settings.rs` - Options page and popup operations
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { ContentSession } from 'dictcore';
//!
//! await init();
//!
//! let timer;
//! const session = new ContentSession(
//!   undefined,
//!   (records) => arm(session.handleMutations(records)),
//!   (event) => session.pointerEnter(event),
//!   (event) => session.pointerLeave(event),
//! );
//! const arm = (request) => {
//!   if (!request) return;
//!   clearTimeout(timer);
//!   timer = setTimeout(() => session.fireTimer(request.token), request.delayMs);
//! };
//! const load = async (ticket) => {
//!   if (ticket === undefined) return;
//!   session.completeRefresh(ticket, await chrome.storage.local.get(null));
//! };
//!
//! await load(session.initialize(await chrome.storage.sync.get(null)));
//! chrome.storage.onChanged.addListener((changes, area) =>
//!   load(session.applyStorageChanges(area, changes)));
//! window.addEventListener('pagehide', () => session.teardown());
//! ```

pub mod config;
pub mod dictionary;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod logging;
pub mod policy;
pub mod registration;
pub mod session;
pub mod settings;

#[cfg(target_arch = "wasm32")]
mod wasm;

// Public exports
pub use config::HighlighterConfig;
pub use dictionary::store::{KeyValueStore, MemoryStore, Namespace, StorageChange, StorageChanges};
pub use dictionary::{Dictionary, DictionaryCache, DictionaryDelta, RefreshTicket};
pub use dom::{Document, MutationRecord, NodeId, NodeKind, Rect, VirtualDocument};
pub use error::{DictError, Result, StoreError};
pub use highlight::*;
pub use policy::{Allowlist, EnablementPolicy, Transition};
pub use registration::{register_definition, DefinitionPrompt, RegistrationOutcome};
pub use session::{HighlightSession, SessionStats};

#[cfg(target_arch = "wasm32")]
pub use wasm::{ContentSession, SettingsStore};

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Install the panic hook and the console logger
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init(log::LevelFilter::Info);
}

/// Change the console log level ("error", "warn", "info", "debug", "trace")
#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) {
    log::set_max_level(logging::parse_level(level));
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("dictcore v{}", env!("CARGO_PKG_VERSION"))
}
