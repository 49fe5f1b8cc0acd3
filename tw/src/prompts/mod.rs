//! Prompt Template System
//!
//! Template loading chain:
//! 1. `.tripweaver/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax; output is plain text, so HTML escaping is off.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
