//! Workflow driver: the user actions that make the app call extract-style

use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::labels::{LabelSet, EXTRACT_FROM_IMAGE, STYLE_TEXT_TOGGLE};
use crate::playwright::PlaywrightHandle;
use crate::protocol::{Target, WaitState};
use crate::runner::StepLog;
use crate::upload::SyntheticUpload;

/// Default budget for each located element.
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_millis(5000);

/// Locate an element by any of the label's texts.
pub fn text_target(labels: &LabelSet) -> Target {
    Target::Text {
        label: labels.name().to_string(),
        pattern: labels.regex_source(),
    }
}

/// Attribute constraints for a file-selection input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInputConstraints {
    pub accept: String,
    pub multiple: bool,
    pub disabled: bool,
}

impl FileInputConstraints {
    /// Single enabled input restricted to images.
    pub fn single_image() -> Self {
        Self {
            accept: "image/*".to_string(),
            multiple: false,
            disabled: false,
        }
    }

    pub fn css(&self) -> String {
        let mut css = format!(r#"input[type="file"][accept="{}"]"#, self.accept);
        css.push_str(if self.multiple { "[multiple]" } else { ":not([multiple])" });
        css.push_str(if self.disabled { "[disabled]" } else { ":not([disabled])" });
        css
    }

    /// The qualifying input placed right after `anchor`.
    ///
    /// The page has other file inputs; adjacency is what singles this one out.
    pub fn adjacent_to(&self, anchor: Target) -> Target {
        Target::Adjacent {
            anchor: Box::new(anchor),
            selector: self.css(),
        }
    }
}

/// Drives toggle → extract button → file input → upload
pub struct WorkflowDriver {
    locator_timeout: Duration,
    upload: SyntheticUpload,
    file_input: FileInputConstraints,
}

impl WorkflowDriver {
    pub fn new(locator_timeout: Duration) -> E2eResult<Self> {
        Ok(Self {
            locator_timeout,
            upload: SyntheticUpload::style_png()?,
            file_input: FileInputConstraints::single_image(),
        })
    }

    pub fn upload(&self) -> &SyntheticUpload {
        &self.upload
    }

    /// Run the trigger sequence; each step is recorded in `steps`.
    ///
    /// The interception rule must already be armed, otherwise the request
    /// this fires could slip past it.
    pub async fn trigger(&self, page: &mut PlaywrightHandle, steps: &mut StepLog) -> E2eResult<()> {
        if !page.has_routes() {
            return Err(E2eError::InterceptorNotArmed);
        }

        let timeout = self.locator_timeout;
        let button = text_target(&EXTRACT_FROM_IMAGE);
        let file_input = self.file_input.adjacent_to(button.clone());

        // The toggle can render below the fold.
        steps
            .run(
                "toggle-style-mode",
                page.click(text_target(&STYLE_TEXT_TOGGLE), true, timeout),
            )
            .await?;

        steps
            .run(
                "await-extract-button",
                page.wait_for(button, WaitState::Visible, timeout),
            )
            .await?;

        steps
            .run(
                "locate-file-input",
                page.wait_for(file_input.clone(), WaitState::Attached, timeout),
            )
            .await?;

        steps
            .run(
                "inject-upload",
                page.set_input_files(file_input, self.upload.to_payload(), timeout),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_input_selector() {
        assert_eq!(
            FileInputConstraints::single_image().css(),
            r#"input[type="file"][accept="image/*"]:not([multiple]):not([disabled])"#
        );
    }

    #[test]
    fn test_adjacent_target_keeps_anchor() {
        let target = FileInputConstraints::single_image().adjacent_to(text_target(&EXTRACT_FROM_IMAGE));
        match &target {
            Target::Adjacent { anchor, selector } => {
                assert!(selector.starts_with("input[type=\"file\"]"));
                assert_eq!(**anchor, text_target(&EXTRACT_FROM_IMAGE));
            }
            other => panic!("unexpected target: {:?}", other),
        }
        assert!(target.describe().contains("after text(extract-from-image"));
    }

    #[test]
    fn test_text_target_uses_both_locales() {
        match text_target(&STYLE_TEXT_TOGGLE) {
            Target::Text { label, pattern } => {
                assert_eq!(label, "style-text-toggle");
                assert_eq!(pattern, "使用文字描述风格|Use text description for style");
            }
            other => panic!("unexpected target: {:?}", other),
        }
    }
}
