use crate::compiler::PlanCompiler;
use crate::error::PlanError;
use crate::plan::{NamedSubQueryPlan, RootPlan};
use crate::query::GenerateQuery;
use oxrdf::NamedNode;
use spargebra::term::NamedNodePattern;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The compiled named sub-queries available during an evaluation session.
///
/// Named sub-query calls are kept unresolved in the plans: the evaluator looks them up here by name
/// when they are executed. Sub-queries may be registered in any order, forward references included.
///
/// ```
/// use oxrdf::{NamedNode, Variable};
/// use spargebra::term::NamedNodePattern;
/// use spargen::{GenerateQuery, NamedSubQueryPlan, PlanCompiler, QueryForm, SubQueryRegistry};
///
/// let name = NamedNode::new("http://example.com/persons")?;
/// let mut definition = GenerateQuery::new(QueryForm::Generate(Vec::new()));
/// definition.name = Some(name.clone());
/// definition.signature = Some(vec![Variable::new("person")?]);
///
/// let mut registry = SubQueryRegistry::new();
/// registry.register(&PlanCompiler::new(), definition)?;
/// let call = NamedSubQueryPlan {
///     base_iri: None,
///     name: NamedNodePattern::NamedNode(name),
///     parameters: Vec::new(),
/// };
/// assert!(!registry.resolve(&call).unwrap().is_top_level);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct SubQueryRegistry {
    plans: HashMap<NamedNode, Arc<RootPlan>>,
}

impl SubQueryRegistry {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a named sub-query definition and registers it under its name.
    ///
    /// A previously registered sub-query with the same name is replaced.
    pub fn register(
        &mut self,
        compiler: &PlanCompiler,
        query: impl Into<Arc<GenerateQuery>>,
    ) -> Result<(), PlanError> {
        let query = query.into();
        let Some(name) = query.name.clone() else {
            return Err(PlanError::InvalidPlan(
                "Only queries with a name can be registered as named sub-queries".into(),
            ));
        };
        let plan = compiler.compile_plan_for_sub_query(query)?;
        debug!("Registering named sub-query {name}");
        self.plans.insert(name, Arc::new(plan));
        Ok(())
    }

    pub fn get(&self, name: &NamedNode) -> Option<&RootPlan> {
        self.plans.get(name).map(Arc::as_ref)
    }

    /// Looks up the target of a call.
    ///
    /// Calls through a variable are resolved once the variable is bound: use [`get`](Self::get) then.
    pub fn resolve(&self, call: &NamedSubQueryPlan) -> Option<&RootPlan> {
        match &call.name {
            NamedNodePattern::NamedNode(name) => self.get(name),
            NamedNodePattern::Variable(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
