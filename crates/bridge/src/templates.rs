//! Page rendering with Handlebars.
//!
//! Views are compiled into the binary and registered once at startup along
//! with the helpers the pages rely on.

use anyhow::{Context, Result};
use axum::response::Html;
use handlebars::{
    html_escape, Context as HbsContext, Handlebars, Helper, HelperResult, Output, RenderContext,
};
use serde::Serialize;
use std::sync::Arc;

/// Views shipped with the service, by name.
const VIEWS: &[(&str, &str)] = &[
    ("github-setup", include_str!("../views/github-setup.hbs")),
    (
        "github-configuration",
        include_str!("../views/github-configuration.hbs"),
    ),
    (
        "github-installations",
        include_str!("../views/github-installations.hbs"),
    ),
    (
        "github-subscriptions",
        include_str!("../views/github-subscriptions.hbs"),
    ),
    (
        "jira-configuration",
        include_str!("../views/jira-configuration.hbs"),
    ),
    ("github-error", include_str!("../views/github-error.hbs")),
];

const PARTIALS: &[(&str, &str)] = &[("head", include_str!("../views/partials/head.hbs"))];

fn param_str<'a>(h: &'a Helper, idx: usize) -> &'a str {
    h.param(idx).and_then(|p| p.value().as_str()).unwrap_or("")
}

/// `{{toLowerCase value}}`
fn to_lower_case_helper(
    h: &Helper,
    _: &Handlebars,
    _: &HbsContext,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&html_escape(&param_str(h, 0).to_lowercase()))?;
    Ok(())
}

/// `{{replaceSpaceWithHyphen value}}`
fn replace_space_with_hyphen_helper(
    h: &Helper,
    _: &Handlebars,
    _: &HbsContext,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&html_escape(&param_str(h, 0).replace(' ', "-")))?;
    Ok(())
}

/// `{{ifAllReposSynced synced total}}`
fn if_all_repos_synced_helper(
    h: &Helper,
    _: &Handlebars,
    _: &HbsContext,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let synced = h.param(0).map(|p| p.value().clone()).unwrap_or_default();
    let total = h.param(1).map(|p| p.value().clone()).unwrap_or_default();
    out.write(&html_escape(&repos_synced_label(&synced, &total)))?;
    Ok(())
}

/// Label shown while the repository count is not known yet.
pub const UNKNOWN_TOTAL_LABEL: &str = "Unknown";

/// `total` when every repository is synced, otherwise `synced / total`.
/// A missing total means the sync has not listed repositories yet.
#[must_use]
pub fn repos_synced_label(synced: &serde_json::Value, total: &serde_json::Value) -> String {
    if total.is_null() {
        return UNKNOWN_TOTAL_LABEL.to_string();
    }
    let show = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    if synced == total {
        show(total)
    } else {
        format!("{} / {}", show(synced), show(total))
    }
}

/// Registered views.
#[derive(Clone)]
pub struct Templates {
    handlebars: Arc<Handlebars<'static>>,
}

impl Templates {
    /// Register the built-in views and helpers.
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        handlebars.register_helper("toLowerCase", Box::new(to_lower_case_helper));
        handlebars.register_helper(
            "replaceSpaceWithHyphen",
            Box::new(replace_space_with_hyphen_helper),
        );
        handlebars.register_helper("ifAllReposSynced", Box::new(if_all_repos_synced_helper));

        for (name, source) in PARTIALS {
            handlebars
                .register_partial(name, *source)
                .with_context(|| format!("Failed to register partial {name}"))?;
        }
        for (name, source) in VIEWS {
            handlebars
                .register_template_string(name, *source)
                .with_context(|| format!("Failed to register view {name}"))?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render a view to HTML.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<Html<String>> {
        self.handlebars
            .render(name, data)
            .map(Html)
            .with_context(|| format!("Failed to render view {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repos_synced_label() {
        assert_eq!(repos_synced_label(&json!(3), &json!(3)), "3");
        assert_eq!(repos_synced_label(&json!(1), &json!(3)), "1 / 3");
    }

    #[test]
    fn test_repos_synced_label_without_total() {
        assert_eq!(repos_synced_label(&json!(0), &json!(null)), "Unknown");
        assert_eq!(repos_synced_label(&json!(null), &json!(null)), "Unknown");
    }

    #[test]
    fn test_helpers_in_template() {
        let templates = Templates::new().unwrap();
        let mut handlebars = (*templates.handlebars).clone();
        handlebars
            .register_template_string(
                "t",
                "{{toLowerCase name}}|{{replaceSpaceWithHyphen status}}|{{ifAllReposSynced synced total}}",
            )
            .unwrap();

        let rendered = handlebars
            .render(
                "t",
                &json!({ "name": "OctoOrg", "status": "IN PROGRESS", "synced": 2, "total": 5 }),
            )
            .unwrap();
        assert_eq!(rendered, "octoorg|IN-PROGRESS|2 / 5");
    }

    #[test]
    fn test_render_error_page() {
        let templates = Templates::new().unwrap();
        let Html(page) = templates
            .render("github-error", &json!({ "title": "GitHub + Jira integration" }))
            .unwrap();
        assert!(page.contains("GitHub + Jira integration"));
    }
}
