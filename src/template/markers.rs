//! Header/footer extraction from a fully rendered page.
//!
//! A page is rendered once per request with the body left out; everything
//! before `<!--START_BODY-->` is the header, everything after
//! `<!--END_BODY-->` is the footer.

use axum::http::request::Parts;

use crate::template::{TemplateBlock, TemplateEngine, TemplateVariant};

/// Marker ending the header fragment.
pub const START_BODY_MARKER: &str = "<!--START_BODY-->";
/// Marker starting the footer fragment.
pub const END_BODY_MARKER: &str = "<!--END_BODY-->";

type PageRenderer = dyn Fn(&Parts, TemplateVariant) -> String + Send + Sync;

/// A `TemplateEngine` that cuts fragments out of a rendered page.
pub struct MarkerTemplate {
    render_page: Box<PageRenderer>,
}

impl MarkerTemplate {
    /// Use `render_page` to produce the full page for a request and variant.
    pub fn new<F>(render_page: F) -> Self
    where
        F: Fn(&Parts, TemplateVariant) -> String + Send + Sync + 'static,
    {
        Self {
            render_page: Box::new(render_page),
        }
    }

    /// Serve the same static page for every request and variant.
    pub fn from_page(page: impl Into<String>) -> Self {
        let page = page.into();
        Self::new(move |_, _| page.clone())
    }
}

impl TemplateEngine for MarkerTemplate {
    fn render(&self, request: &Parts, variant: TemplateVariant, block: TemplateBlock) -> String {
        let page = (self.render_page)(request, variant);
        extract_block(&page, block).unwrap_or_else(|| {
            tracing::warn!(?block, %variant, "Template page is missing its body marker");
            String::new()
        })
    }
}

/// Cut one fragment out of a page. `None` when the marker is absent.
pub fn extract_block(page: &str, block: TemplateBlock) -> Option<String> {
    match block {
        TemplateBlock::Header => page
            .split_once(START_BODY_MARKER)
            .map(|(header, _)| header.to_string()),
        // Only the segment after the first end marker, up to any later one.
        TemplateBlock::Footer => page.split(END_BODY_MARKER).nth(1).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const PAGE: &str = "<html><nav>menu</nav><!--START_BODY--><--SPLIT--><!--END_BODY--><footer>(c)</footer></html>";

    fn parts() -> Parts {
        Request::builder().uri("/").body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extract_header_and_footer() {
        assert_eq!(
            extract_block(PAGE, TemplateBlock::Header).as_deref(),
            Some("<html><nav>menu</nav>")
        );
        assert_eq!(
            extract_block(PAGE, TemplateBlock::Footer).as_deref(),
            Some("<footer>(c)</footer></html>")
        );
    }

    #[test]
    fn test_missing_marker_renders_empty() {
        let template = MarkerTemplate::from_page("<html>no markers</html>");
        assert_eq!(
            template.render(&parts(), TemplateVariant::Thick, TemplateBlock::Footer),
            ""
        );
    }

    #[test]
    fn test_variant_selects_page() {
        let template = MarkerTemplate::new(|_, variant| match variant {
            TemplateVariant::Thin => "thin<!--START_BODY-->".to_string(),
            TemplateVariant::Thick => "thick<!--START_BODY-->".to_string(),
        });
        let parts = parts();
        assert_eq!(
            template.render(&parts, TemplateVariant::Thin, TemplateBlock::Header),
            "thin"
        );
        assert_eq!(
            template.render(&parts, TemplateVariant::Thick, TemplateBlock::Header),
            "thick"
        );
    }

    #[test]
    fn test_footer_stops_at_repeated_end_marker() {
        let page = "<nav/><!--START_BODY--><!--END_BODY--><footer/><!--END_BODY--><script>stray</script>";
        assert_eq!(extract_block(page, TemplateBlock::Footer).as_deref(), Some("<footer/>"));
    }
}
