//! Page highlighting engine
//!
//! - `matcher.rs` - TermMatcher: Aho-Corasick pre-check and term splitting
//! - `renderer.rs` - Renderer: iterative walk, fragment replacement
//! - `index.rs` - HighlightIndex: Term → highlight elements
//! - `tooltip.rs` - TooltipManager: one floating definition per term
//! - `reversal.rs` - remove_term / disable_all
//! - `coordinator.rs` - MutationCoordinator: debounce + observation guard

pub mod coordinator;
pub mod index;
pub mod matcher;
pub mod renderer;
pub mod reversal;
pub mod tooltip;

pub use coordinator::{affected_roots, CoordinatorState, MutationCoordinator, Suspended, TimerRequest, TimerToken};
pub use index::HighlightIndex;
pub use matcher::TermMatcher;
pub use renderer::{RenderContext, Renderer, ScanStats};
pub use tooltip::{TooltipManager, TooltipPlacement};

#[cfg(test)]
mod tests;
