use handlebars::{Handlebars, HelperDef};
use serde::Serialize;
use serde_json::Value;

use crate::error::EngineError;

/// Context injected into every template evaluation: the observed value,
/// the rule snapshot, and the opaque aggregations subtree (spec.md §4.6).
#[derive(Debug, Serialize)]
pub struct TemplateContext<'a> {
    pub value: f64,
    pub object: &'a crate::domain::SearchRule,
    pub aggregations: &'a Option<Value>,
}

pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_helper("round0", Box::new(Round0Helper));
        Self { handlebars }
    }

    /// Evaluates `template` against `ctx`. On error, surfaces
    /// `EvaluateTemplateError` (spec.md §4.6).
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, EngineError> {
        self.handlebars
            .render_template(template, ctx)
            .map_err(|err| EngineError::EvaluateTemplateError(err.to_string()))
    }
}

/// `{{round0 value}}` formats a float with zero decimal places, covering
/// the "%.0f"-style formatting spec.md's scenario 2 demonstrates (Go's
/// `{{ .value | printf "%.0f" }}` has no direct handlebars equivalent).
struct Round0Helper;

impl HelperDef for Round0Helper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &handlebars::Helper<'rc>,
        _: &Handlebars<'reg>,
        _: &handlebars::Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
        out: &mut dyn handlebars::Output,
    ) -> handlebars::HelperResult {
        let value = h
            .param(0)
            .and_then(|p| p.value().as_f64())
            .ok_or_else(|| handlebars::RenderErrorReason::Other("round0 expects a numeric argument".into()))?;
        out.write(&format!("{:.0}", value))?;
        Ok(())
    }
}
