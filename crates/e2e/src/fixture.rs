//! Per-scenario browser context bootstrap

use crate::error::E2eResult;

/// Client-side state seeded before any app script runs.
///
/// The entries are installed through an init script on a fresh browser
/// context, so they are already present on first paint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixture {
    local_storage: Vec<(String, String)>,
}

impl Fixture {
    /// Marks the first-run help modal as already seen.
    pub fn onboarding_dismissed() -> Self {
        Self::default().with_local_storage("hasSeenHelpModal", "true")
    }

    pub fn with_local_storage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.local_storage.push((key.into(), value.into()));
        self
    }

    pub fn local_storage(&self) -> &[(String, String)] {
        &self.local_storage
    }

    /// Render the init script, or `None` if there is nothing to seed.
    pub fn init_script(&self) -> E2eResult<Option<String>> {
        if self.local_storage.is_empty() {
            return Ok(None);
        }

        let mut body = String::new();
        for (key, value) in &self.local_storage {
            body.push_str(&format!(
                "localStorage.setItem({}, {});",
                serde_json::to_string(key)?,
                serde_json::to_string(value)?
            ));
        }

        // Opaque origins (about:blank) throw on localStorage access.
        Ok(Some(format!("(() => {{ try {{ {} }} catch (_) {{}} }})();", body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onboarding_fixture_script() {
        let script = Fixture::onboarding_dismissed().init_script().unwrap().unwrap();
        assert!(script.contains(r#"localStorage.setItem("hasSeenHelpModal", "true");"#));
        assert!(script.starts_with("(() => {"));
    }

    #[test]
    fn test_values_are_escaped() {
        let script = Fixture::default()
            .with_local_storage("k", "it's \"quoted\"")
            .init_script()
            .unwrap()
            .unwrap();
        assert!(script.contains(r#""it's \"quoted\"""#));
    }

    #[test]
    fn test_empty_fixture_has_no_script() {
        assert!(Fixture::default().init_script().unwrap().is_none());
    }
}
