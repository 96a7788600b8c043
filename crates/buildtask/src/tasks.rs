//! Build task variants.
//!
//! Each task name maps to one [`CommandSpec`]. Commands and sub-paths are
//! Handlebars templates rendered with `project_name` and `mount_path`.

use crate::error::{Error, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

const MAVEN_IMAGE: &str = "docker.io/maven:3.6";

/// A build recipe selected by task name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    /// Build container image
    pub image: String,

    /// Shell command, run through `/bin/sh -c`
    pub command: String,

    /// Sub-path of the workspace volume mounted into the build container
    pub sub_path: String,
}

/// The set of known build tasks
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskCatalog {
    /// Variant used for unknown task names
    pub default_task: String,

    /// Task name that publishes the application after a successful build
    pub full_task: String,

    pub variants: BTreeMap<String, CommandSpec>,
}

/// The variant chosen for one invocation
#[derive(Debug, Clone)]
pub struct SelectedTask<'a> {
    /// Task name as requested by the caller
    pub requested: &'a str,

    /// Name of the variant actually used
    pub name: &'a str,

    pub spec: &'a CommandSpec,
}

impl SelectedTask<'_> {
    pub fn fell_back(&self) -> bool {
        self.requested != self.name
    }
}

/// Values available to command and sub-path templates
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub project_name: &'a str,
    pub mount_path: &'a str,
}

impl TemplateContext<'_> {
    /// Render a template string.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        let context = json!({
            "project_name": self.project_name,
            "mount_path": self.mount_path.trim_end_matches('/'),
        });

        Ok(handlebars.render_template(template, &context)?)
    }
}

impl Default for TaskCatalog {
    fn default() -> Self {
        let build = |goals: &str| {
            format!(
                "echo listing {{{{mount_path}}}}/src && ls -la {{{{mount_path}}}}/src \
                 && echo copying {{{{mount_path}}}}/src to /tmp/app && cp -rf {{{{mount_path}}}}/src /tmp/app \
                 && id && chown -R 1001 /tmp/app && cd /tmp/app \
                 && mvn -B {goals} -Dmaven.repo.local={{{{mount_path}}}}/cache/.m2/repository -DskipTests=true \
                 && echo copying /tmp/app/target to {{{{mount_path}}}}/output \
                 && cp -rf /tmp/app/target {{{{mount_path}}}}/output && chown -fR 1001 {{{{mount_path}}}}/output \
                 && mkdir -p {{{{mount_path}}}}/buildartifacts \
                 && cp -rf /tmp/app/target/liberty/wlp/usr/servers/defaultServer/. {{{{mount_path}}}}/buildartifacts \
                 && chown -fR 1001 {{{{mount_path}}}}/buildartifacts && ls -la {{{{mount_path}}}}/output"
            )
        };

        let mut variants = BTreeMap::new();
        variants.insert(
            "full".to_string(),
            CommandSpec {
                image: MAVEN_IMAGE.to_string(),
                command: build("clean package"),
                sub_path: "projects/{{project_name}}".to_string(),
            },
        );
        variants.insert(
            "incremental".to_string(),
            CommandSpec {
                image: MAVEN_IMAGE.to_string(),
                command: build("package"),
                sub_path: "projects/{{project_name}}".to_string(),
            },
        );
        variants.insert(
            "update".to_string(),
            CommandSpec {
                image: MAVEN_IMAGE.to_string(),
                command: "echo updating {{project_name}} resources \
                          && mkdir -p {{mount_path}}/buildartifacts \
                          && cp -rf {{mount_path}}/src/src/main/liberty/config/. {{mount_path}}/buildartifacts \
                          && chown -fR 1001 {{mount_path}}/buildartifacts \
                          && ls -la {{mount_path}}/buildartifacts"
                    .to_string(),
                sub_path: "projects/{{project_name}}".to_string(),
            },
        );

        Self {
            default_task: "full".to_string(),
            full_task: "full".to_string(),
            variants,
        }
    }
}

impl TaskCatalog {
    /// Pick the variant for `task_name`; unknown names use the default variant.
    ///
    /// Matching is exact and case-sensitive. Call [`TaskCatalog::validate`]
    /// first; a validated catalog always contains its default variant.
    pub fn select<'a>(&'a self, task_name: &'a str) -> Result<SelectedTask<'a>> {
        if let Some((name, spec)) = self.variants.get_key_value(task_name) {
            info!("Selected build task: {}", name);
            return Ok(SelectedTask {
                requested: task_name,
                name,
                spec,
            });
        }

        let (name, spec) = self
            .variants
            .get_key_value(&self.default_task)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Default task '{}' is not defined",
                    self.default_task
                ))
            })?;
        warn!(
            "Unknown build task '{}', falling back to '{}'",
            task_name, name
        );
        Ok(SelectedTask {
            requested: task_name,
            name,
            spec,
        })
    }

    /// Whether `task_name` requests publication of the application.
    pub fn is_full_mode(&self, task_name: &str) -> bool {
        task_name == self.full_task
    }

    /// Check the catalog once, at load time.
    pub fn validate(&self) -> Result<()> {
        if !self.variants.contains_key(&self.default_task) {
            return Err(Error::Config(format!(
                "tasks.defaultTask '{}' is not a defined variant",
                self.default_task
            )));
        }
        if !self.variants.contains_key(&self.full_task) {
            return Err(Error::Config(format!(
                "tasks.fullTask '{}' is not a defined variant",
                self.full_task
            )));
        }

        let probe = TemplateContext {
            project_name: "validation",
            mount_path: "/data",
        };
        for (name, spec) in &self.variants {
            if spec.command.trim().is_empty() || spec.image.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Task '{name}' needs both an image and a command"
                )));
            }
            probe.render(&spec.command).map_err(|e| {
                Error::Config(format!("Task '{name}' has an invalid command template: {e}"))
            })?;
            let sub_path = probe.render(&spec.sub_path).map_err(|e| {
                Error::Config(format!("Task '{name}' has an invalid subPath template: {e}"))
            })?;
            if sub_path.starts_with('/') {
                return Err(Error::Config(format!(
                    "Task '{name}' subPath must be relative, got '{sub_path}'"
                )));
            }
        }

        Ok(())
    }
}
