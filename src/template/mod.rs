//! Template engine interface.
//!
//! # Data Flow
//! ```text
//! transform pipeline (status 200, text/html)
//!     → TemplateEngine::render(request, variant, Header)
//!     → original body
//!     → TemplateEngine::render(request, variant, Footer)
//! ```
//!
//! # Design Decisions
//! - The engine is opaque to the proxy: (request, variant, block) → markup
//! - markers.rs offers the common "render a page, cut at markers" engine

use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod markers;

pub use markers::MarkerTemplate;

/// Which pre-rendered page the fragments are cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVariant {
    Thin,
    #[default]
    Thick,
}

impl fmt::Display for TemplateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateVariant::Thin => f.write_str("thin"),
            TemplateVariant::Thick => f.write_str("thick"),
        }
    }
}

/// The fragment requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateBlock {
    Header,
    Footer,
}

/// Renders header/footer markup for an inbound request.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, request: &Parts, variant: TemplateVariant, block: TemplateBlock) -> String;
}

impl<F> TemplateEngine for F
where
    F: Fn(&Parts, TemplateVariant, TemplateBlock) -> String + Send + Sync,
{
    fn render(&self, request: &Parts, variant: TemplateVariant, block: TemplateBlock) -> String {
        self(request, variant, block)
    }
}
