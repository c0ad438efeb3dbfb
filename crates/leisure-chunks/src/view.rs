//! Live views: markup bound to a named data cell, re-rendered whenever the
//! chunk behind that name changes.

use serde_json::Value;

use crate::binding::Binding;
use crate::markup::Markup;
use crate::template::RenderContext;

pub type ViewFn = Box<dyn Fn(Option<&Value>, &RenderContext<'_>) -> Markup + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub(crate) usize);

pub struct LiveView {
    pub(crate) name: String,
    pub(crate) template: ViewFn,
    pub markup: Markup,
    pub bindings: Vec<Binding>,
    pub shown: Vec<String>,
    /// How many times the view has been rendered.
    pub renders: usize,
}

impl LiveView {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for LiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("name", &self.name)
            .field("markup", &self.markup)
            .field("renders", &self.renders)
            .finish_non_exhaustive()
    }
}
