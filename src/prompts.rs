//! Prompt text for image generation.
//!
//! Every string sent to the image model lives here so a wording change is a
//! one-line edit and tests can inspect the prompts without a provider.
//!
//! Callers can override the instruction via
//! [`crate::config::PipelineConfig::prompt_template`]; the constants here are
//! used only when no override is provided.

/// Default instruction wrapped around each segment's text.
///
/// `{text}` is replaced by the segment content.
pub const DEFAULT_IMAGE_PROMPT: &str =
    "Create a high-quality, detailed image based on this text: {text}";

/// Default negative prompt for diffusion models.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, distorted";

/// Build the prompt for one segment.
///
/// Only the first `{text}` placeholder is substituted, so segment text that
/// itself contains `{text}` is passed through untouched.
pub fn image_prompt(template: Option<&str>, segment_text: &str) -> String {
    let template = template.unwrap_or(DEFAULT_IMAGE_PROMPT);
    template.replacen("{text}", segment_text.trim(), 1)
}
