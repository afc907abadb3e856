//! Query descriptors, rendering and request-level query options.

pub mod fragment;
pub mod options;
pub mod translator;

pub use fragment::{FragmentPart, QueryFragment};
pub use options::{QueryOptions, QueryOptionsConfig};
pub use translator::{FragmentTranslator, PlaceholderTranslator, RenderError, RenderedQuery};
