use crate::error::{Error, Result};
use uuid::Uuid;

const MAX_K8S_NAME_LENGTH: usize = 63;
const JOB_SUFFIX_LENGTH: usize = 8;
const SELECTOR_SUFFIX: &str = "-selector";

pub struct ResourceNaming;

impl ResourceNaming {
    /// Generate a unique Job name for one invocation
    /// Format: {prefix}-{8 hex chars}
    pub fn job_name(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        Self::job_name_with_suffix(prefix, &suffix[..JOB_SUFFIX_LENGTH])
    }

    pub fn job_name_with_suffix(prefix: &str, suffix: &str) -> String {
        let available = MAX_K8S_NAME_LENGTH.saturating_sub(suffix.len() + 1);
        let base = Self::dns_label(prefix, available);
        format!("{base}-{suffix}")
    }

    /// Name of the published Service and Deployment for a project
    pub fn application_name(prefix: &str, project_name: &str) -> String {
        Self::dns_label(&format!("{prefix}{project_name}"), MAX_K8S_NAME_LENGTH)
    }

    /// `app` label value selecting the application pods, within the label length limit
    pub fn application_selector(application_name: &str) -> String {
        let base = Self::dns_label(
            application_name,
            MAX_K8S_NAME_LENGTH - SELECTOR_SUFFIX.len(),
        );
        format!("{base}{SELECTOR_SUFFIX}")
    }

    /// Project names end up in volume sub-paths and `/bin/sh -c` commands.
    ///
    /// Accepts ASCII alphanumerics, '-', '_' and '.', starting with an
    /// alphanumeric, at most 63 characters.
    pub fn validate_project_name(project_name: &str) -> Result<()> {
        let starts_alphanumeric = project_name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric());
        let allowed = project_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if !starts_alphanumeric || !allowed || project_name.len() > MAX_K8S_NAME_LENGTH {
            return Err(Error::Config(format!(
                "Invalid project name '{project_name}': use up to {MAX_K8S_NAME_LENGTH} letters, digits, '-', '_' or '.', starting with a letter or digit"
            )));
        }
        Ok(())
    }

    /// Lowercase RFC 1123 label: alphanumerics and '-', starting and ending alphanumeric
    fn dns_label(input: &str, max_len: usize) -> String {
        let mut label: String = input
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();

        if label.len() > max_len {
            label.truncate(max_len);
        }

        let trimmed = label.trim_matches('-');
        if trimmed.is_empty() {
            "app".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn sanitize_label_value(input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }

        // Replace spaces with hyphens, convert to lowercase
        let mut sanitized = input.to_lowercase().replace([' ', '_'], "-");

        // Remove any characters that aren't alphanumeric, hyphens, underscores, or dots
        sanitized.retain(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

        // Ensure it starts and ends with alphanumeric
        let trimmed = sanitized.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        sanitized = trimmed.to_string();

        // Truncate to 63 characters (Kubernetes label limit)
        if sanitized.len() > MAX_K8S_NAME_LENGTH {
            sanitized.truncate(MAX_K8S_NAME_LENGTH);
            if let Some(last_alphanumeric) = sanitized.rfind(|c: char| c.is_ascii_alphanumeric()) {
                sanitized.truncate(last_alphanumeric + 1);
            }
        }

        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_name_is_unique_and_prefixed() {
        let first = ResourceNaming::job_name("codewind-liberty-build-job");
        let second = ResourceNaming::job_name("codewind-liberty-build-job");
        assert!(first.starts_with("codewind-liberty-build-job-"));
        assert_eq!(first.len(), "codewind-liberty-build-job-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn test_long_job_prefix_truncated() {
        let name = ResourceNaming::job_name_with_suffix(&"a".repeat(100), "deadbeef");
        assert_eq!(name.len(), 63);
        assert!(name.ends_with("-deadbeef"));
    }

    #[test]
    fn test_application_name() {
        assert_eq!(ResourceNaming::application_name("cw-", "Demo_App"), "cw-demo-app");
        assert_eq!(ResourceNaming::application_name("cw-", "demo."), "cw-demo");
        assert!(ResourceNaming::application_name("cw-", &"x".repeat(80)).len() <= 63);
    }

    #[test]
    fn test_application_selector_fits_label_limit() {
        assert_eq!(ResourceNaming::application_selector("cw-demo"), "cw-demo-selector");

        let name = ResourceNaming::application_name("cw-", &"p".repeat(60));
        let selector = ResourceNaming::application_selector(&name);
        assert_eq!(selector.len(), 63);
        assert!(selector.ends_with("-selector"));
    }

    #[test]
    fn test_project_name_validation() {
        for valid in ["demo", "Demo_App", "my-app.v2", "0day"] {
            assert!(ResourceNaming::validate_project_name(valid).is_ok(), "{valid}");
        }
        let too_long = "p".repeat(64);
        for invalid in [
            "",
            "demo; rm -rf /data",
            "$(id)",
            "my project",
            "it's",
            "../escape",
            "-demo",
            too_long.as_str(),
        ] {
            assert!(
                matches!(ResourceNaming::validate_project_name(invalid), Err(Error::Config(_))),
                "{invalid}"
            );
        }
    }

    #[test]
    fn test_sanitize_label_value() {
        assert_eq!(ResourceNaming::sanitize_label_value("My Project"), "my-project");
        assert_eq!(ResourceNaming::sanitize_label_value("-demo-"), "demo");
        assert_eq!(ResourceNaming::sanitize_label_value("a/b@c"), "abc");
        assert_eq!(ResourceNaming::sanitize_label_value(""), "");
        assert!(ResourceNaming::sanitize_label_value(&"p".repeat(70)).len() <= 63);
    }
}
