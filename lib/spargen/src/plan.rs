//! Execution plans produced by the [`PlanCompiler`](crate::PlanCompiler).
//!
//! Plans are trees: every node exclusively owns its children and is never mutated
//! once built. They are compiled once and may then be evaluated many times.

use crate::query::GenerateQuery;
use oxiri::Iri;
use oxrdf::{NamedNode, Variable};
use spargebra::Query;
use spargebra::algebra::Expression;
use spargebra::term::{NamedNodePattern, TriplePattern};
use std::fmt;
use std::sync::Arc;

/// The plan of a whole query.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct RootPlan {
    /// The query this plan was compiled from, kept for diagnostics.
    ///
    /// If the query had to be normalized, this is the normalized query.
    pub source_query: Arc<GenerateQuery>,
    /// Plans of the binding clauses, in declaration order.
    pub binding_clauses: Vec<BindingsClausePlan>,
    pub select: SelectPlan,
    pub output_form: Option<OutputFormPlan>,
    /// If the plan is the plan of the query given by the user and not of a sub-query.
    pub is_top_level: bool,
}

impl RootPlan {
    /// Formats using a [SPARQL S-Expression](https://jena.apache.org/documentation/notes/sse.html) like syntax.
    ///
    /// ```
    /// use spargen::{GenerateQuery, PlanCompiler, QueryForm};
    ///
    /// let plan = PlanCompiler::new().compile(GenerateQuery::new(QueryForm::Select))?;
    /// assert_eq!(plan.to_sse(), "(root top (bindings) (select select () (bgp)))");
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn to_sse(&self) -> String {
        let mut buffer = String::new();
        self.fmt_sse(&mut buffer).unwrap();
        buffer
    }

    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(
            f,
            "(root {} (bindings",
            if self.is_top_level { "top" } else { "nested" }
        )?;
        for clause in &self.binding_clauses {
            f.write_str(" ")?;
            clause.fmt_sse(f)?;
        }
        f.write_str(") ")?;
        self.select.fmt_sse(f)?;
        if let Some(output_form) = &self.output_form {
            f.write_str(" ")?;
            output_form.fmt_sse(f)?;
        }
        f.write_str(")")
    }
}

/// The plan of an `ITERATOR`, `SOURCE` or `BIND` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum BindingsClausePlan {
    Iterator(IteratorPlan),
    Source(SourcePlan),
    Bind(BindPlan),
}

impl BindingsClausePlan {
    /// The variables bound by this clause.
    pub fn variables(&self) -> &[Variable] {
        match self {
            Self::Iterator(plan) => &plan.variables,
            Self::Source(plan) => std::slice::from_ref(&plan.variable),
            Self::Bind(plan) => std::slice::from_ref(&plan.variable),
        }
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::Iterator(plan) => plan.fmt_sse(f),
            Self::Source(plan) => plan.fmt_sse(f),
            Self::Bind(plan) => plan.fmt_sse(f),
        }
    }
}

impl From<IteratorPlan> for BindingsClausePlan {
    #[inline]
    fn from(plan: IteratorPlan) -> Self {
        Self::Iterator(plan)
    }
}

impl From<SourcePlan> for BindingsClausePlan {
    #[inline]
    fn from(plan: SourcePlan) -> Self {
        Self::Source(plan)
    }
}

impl From<BindPlan> for BindingsClausePlan {
    #[inline]
    fn from(plan: BindPlan) -> Self {
        Self::Bind(plan)
    }
}

/// How the evaluator must schedule an iterator relative to its siblings.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum IteratorMode {
    /// The iterator bindings must be exhausted in order, in lock-step with the sibling clauses.
    Sync,
    /// The iterator may be interleaved with the sibling `GENERATE` sub-queries.
    Async,
}

impl fmt::Display for IteratorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "sync",
            Self::Async => "async",
        })
    }
}

/// The plan of an `ITERATOR <function>(args...) AS ?v1 ?v2 ...` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct IteratorPlan {
    pub mode: IteratorMode,
    pub function: NamedNode,
    pub arguments: Vec<Expression>,
    /// Never empty.
    pub variables: Vec<Variable>,
}

impl IteratorPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(iterator {} {} (", self.mode, self.function)?;
        fmt_list(f, &self.arguments)?;
        f.write_str(") (")?;
        fmt_list(f, &self.variables)?;
        f.write_str("))")
    }
}

/// The plan of a `SOURCE <locator> ACCEPT <media type> AS ?v` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SourcePlan {
    pub source: NamedNodePattern,
    pub accept: Option<NamedNodePattern>,
    pub variable: Variable,
}

impl SourcePlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(source {}", self.source)?;
        if let Some(accept) = &self.accept {
            write!(f, " (accept {accept})")?;
        }
        write!(f, " {})", self.variable)
    }
}

/// The plan of a `BIND(expression AS ?v)` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct BindPlan {
    pub expression: Expression,
    pub variable: Variable,
}

impl BindPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(bind {} {})", self.variable, self.expression)
    }
}

/// The plain SPARQL query evaluated after the binding clauses.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SelectPlan {
    /// Always a [`Query::Select`].
    pub query: Query,
    /// If the source query is a SPARQL-Generate `SELECT` query.
    pub is_select_type: bool,
    /// The formal parameters the query results are grouped by (possibly empty).
    pub signature: Vec<Variable>,
}

impl SelectPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(
            f,
            "(select {}(",
            if self.is_select_type { "select " } else { "" }
        )?;
        fmt_list(f, &self.signature)?;
        write!(f, ") {})", self.query.to_sse())
    }
}

/// The output part of a [`RootPlan`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum OutputFormPlan {
    NamedSubQuery(NamedSubQueryPlan),
    GenerateTemplate(GenerateTemplatePlan),
}

impl OutputFormPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::NamedSubQuery(plan) => plan.fmt_sse(f),
            Self::GenerateTemplate(plan) => plan.fmt_sse(f),
        }
    }
}

/// A call to a named sub-query.
///
/// The target is only referenced by name: resolving it is left to the evaluator
/// (see [`SubQueryRegistry`](crate::SubQueryRegistry)).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct NamedSubQueryPlan {
    pub base_iri: Option<Iri<String>>,
    pub name: NamedNodePattern,
    pub parameters: Vec<Expression>,
}

impl NamedSubQueryPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(call {} (", self.name)?;
        fmt_list(f, &self.parameters)?;
        f.write_str("))")
    }
}

/// The plan of a `GENERATE { ... }` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GenerateTemplatePlan {
    /// Emission order of the generated output.
    pub elements: Vec<GenerateElementPlan>,
}

impl GenerateTemplatePlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("(generate")?;
        for element in &self.elements {
            f.write_str(" ")?;
            match element {
                GenerateElementPlan::Triples(plan) => plan.fmt_sse(f)?,
                GenerateElementPlan::SubQuery(plan) => plan.fmt_sse(f)?,
            }
        }
        f.write_str(")")
    }
}

/// The plan of an element of a `GENERATE` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GenerateElementPlan {
    Triples(GenerateTriplesPlan),
    SubQuery(Box<RootPlan>),
}

/// Triples instantiated for each solution.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GenerateTriplesPlan {
    pub patterns: Vec<TriplePattern>,
}

impl GenerateTriplesPlan {
    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("(triples")?;
        for pattern in &self.patterns {
            write!(
                f,
                " (triple {} {} {})",
                pattern.subject, pattern.predicate, pattern.object
            )?;
        }
        f.write_str(")")
    }
}

fn fmt_list(f: &mut impl fmt::Write, values: &[impl fmt::Display]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}
