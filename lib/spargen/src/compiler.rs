use crate::error::{ClauseKind, PlanError};
use crate::parser::{ErrorConversionQueryParser, QueryParser};
use crate::plan::{
    BindPlan, BindingsClausePlan, GenerateElementPlan, GenerateTemplatePlan, GenerateTriplesPlan,
    IteratorMode, IteratorPlan, NamedSubQueryPlan, OutputFormPlan, RootPlan, SelectPlan,
    SourcePlan,
};
use crate::query::{BindingClause, GenerateElement, GenerateQuery, QueryForm, TemplateTerm};
use crate::relational::{add_group_by, extract_select_query, has_aggregators};
use oxiri::{Iri, IriParseError};
use oxrdf::Variable;
use spargebra::Query;
use spargebra::algebra::{Expression, Function};
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};
use std::sync::Arc;
use tracing::{debug, trace};

const DEFAULT_MAX_NORMALIZATION_ROUNDS: usize = 8;

/// Compiles [`GenerateQuery`]s into [`RootPlan`]s.
///
/// Compilation is a pure function of the query: the compiler holds no state besides its configuration
/// and may be shared between threads.
///
/// ```
/// use oxrdf::{Literal, NamedNode, Variable};
/// use spargebra::algebra::{Expression, Function};
/// use spargen::{BindingClause, BindingsClausePlan, GenerateQuery, IteratorMode, PlanCompiler, QueryForm};
///
/// let split = NamedNode::new("http://example.com/split")?;
/// let mut query = GenerateQuery::new(QueryForm::Select);
/// query.binding_clauses.push(BindingClause::Iterator {
///     expression: Expression::FunctionCall(
///         Function::Custom(split.clone()),
///         vec![Literal::from("a,b").into(), Literal::from(",").into()],
///     ),
///     variables: vec![Variable::new("x")?],
/// });
/// let plan = PlanCompiler::new().compile(query)?;
/// let BindingsClausePlan::Iterator(iterator) = &plan.binding_clauses[0] else {
///     panic!("an iterator plan is expected")
/// };
/// assert_eq!(iterator.mode, IteratorMode::Sync);
/// assert_eq!(iterator.function, split);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct PlanCompiler {
    base_iri: Option<Iri<String>>,
    parser: Option<Arc<dyn QueryParser<Error = PlanError>>>,
    max_normalization_rounds: usize,
}

impl Default for PlanCompiler {
    fn default() -> Self {
        Self {
            base_iri: None,
            parser: None,
            max_normalization_rounds: DEFAULT_MAX_NORMALIZATION_ROUNDS,
        }
    }
}

impl PlanCompiler {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides an IRI used when the compiled queries do not define their own base IRI.
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base_iri = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Sets the parser used by [`compile_str`](Self::compile_str) and by normalization.
    ///
    /// Without a parser, queries are normalized in place without a serialization round-trip.
    #[must_use]
    pub fn with_parser(mut self, parser: impl QueryParser + 'static) -> Self {
        self.parser = Some(Arc::new(ErrorConversionQueryParser(parser)));
        self
    }

    /// Sets how many normalization rounds a query may go through before the compiler gives up.
    ///
    /// A query is expected to be fully normalized after a single round.
    #[must_use]
    pub fn with_max_normalization_rounds(mut self, max_normalization_rounds: usize) -> Self {
        self.max_normalization_rounds = max_normalization_rounds;
        self
    }

    /// Parses the query with the configured parser and compiles it as a top level query.
    pub fn compile_str(&self, query: &str) -> Result<RootPlan, PlanError> {
        let Some(parser) = &self.parser else {
            return Err(PlanError::InvalidPlan(
                "No parser is configured to parse the query".into(),
            ));
        };
        let query = parser.parse_query(query, self.base_iri.as_ref())?;
        trace!("Creating plan for query:\n{query}");
        self.compile(query)
    }

    /// Compiles a query given by the user.
    pub fn compile(&self, query: impl Into<Arc<GenerateQuery>>) -> Result<RootPlan, PlanError> {
        self.make(query.into(), true)
    }

    /// Compiles a query nested in a `GENERATE` clause or called as a named sub-query.
    pub fn compile_plan_for_sub_query(
        &self,
        query: impl Into<Arc<GenerateQuery>>,
    ) -> Result<RootPlan, PlanError> {
        self.make(query.into(), false)
    }

    fn make(&self, query: Arc<GenerateQuery>, is_top_level: bool) -> Result<RootPlan, PlanError> {
        let query = self.normalize(query)?;
        trace!("Making plan for query\n{query}");

        let mode = if is_top_level || query.is_select_type() || query.is_template_type() {
            IteratorMode::Sync
        } else {
            IteratorMode::Async
        };
        let binding_clauses = query
            .binding_clauses
            .iter()
            .map(|clause| compile_binding_clause(clause, mode))
            .collect::<Result<Vec<_>, _>>()?;
        let select = compile_select(&query);
        let output_form = match &query.form {
            QueryForm::NamedSubQuery { .. } => Some(OutputFormPlan::NamedSubQuery(
                self.compile_named_sub_query(&query)?,
            )),
            QueryForm::Generate(_) => Some(OutputFormPlan::GenerateTemplate(
                self.compile_generate_template(&query)?,
            )),
            QueryForm::Select | QueryForm::Template => None,
        };
        Ok(RootPlan {
            source_query: query,
            binding_clauses,
            select,
            output_form,
            is_top_level,
        })
    }

    /// Rewrites the query until no embedded expression is left.
    fn normalize(&self, mut query: Arc<GenerateQuery>) -> Result<Arc<GenerateQuery>, PlanError> {
        let mut remaining = query.embedded_expression_count();
        let mut rounds = 0;
        while remaining > 0 {
            if rounds >= self.max_normalization_rounds {
                return Err(PlanError::Internal(format!(
                    "{remaining} embedded expressions are left after {rounds} normalization rounds"
                )));
            }
            debug!("Query has {remaining} embedded expressions. Will be normalized");
            let mut rewritten = self.reparse(&query)?;
            rewritten.normalize();
            let left = rewritten.embedded_expression_count();
            if left >= remaining {
                return Err(PlanError::Internal(format!(
                    "Normalization did not reduce the number of embedded expressions ({remaining} before, {left} after)"
                )));
            }
            remaining = left;
            rounds += 1;
            query = Arc::new(rewritten);
        }
        Ok(query)
    }

    fn reparse(&self, query: &GenerateQuery) -> Result<GenerateQuery, PlanError> {
        let Some(parser) = &self.parser else {
            return Ok(query.clone());
        };
        let serialization = query.to_string();
        if query.is_named_sub_query() || (query.name.is_none() && query.signature.is_some()) {
            parser.parse_sub_query(query, &serialization)
        } else {
            parser.parse_query(
                &serialization,
                query.base_iri.as_ref().or(self.base_iri.as_ref()),
            )
        }
    }

    /// Builds the plan of a `GENERATE <name>(...)` call.
    pub fn compile_named_sub_query(
        &self,
        query: &GenerateQuery,
    ) -> Result<NamedSubQueryPlan, PlanError> {
        let QueryForm::NamedSubQuery { name, parameters } = &query.form else {
            return Err(PlanError::InvalidPlan(
                "Query was expected to be a named sub query".into(),
            ));
        };
        Ok(NamedSubQueryPlan {
            base_iri: query.base_iri.clone().or_else(|| self.base_iri.clone()),
            name: name.clone(),
            parameters: parameters.clone(),
        })
    }

    /// Builds the plan of a `GENERATE { ... }` clause, compiling the nested queries as sub-queries.
    pub fn compile_generate_template(
        &self,
        query: &GenerateQuery,
    ) -> Result<GenerateTemplatePlan, PlanError> {
        let Some(elements) = query.generate_clause() else {
            return Err(PlanError::InvalidPlan(
                "Query was expected to be of type GENERATE {...} ...".into(),
            ));
        };
        let elements = elements
            .iter()
            .map(|element| -> Result<_, PlanError> {
                Ok(match element {
                    GenerateElement::Triples(triples) => {
                        GenerateElementPlan::Triples(GenerateTriplesPlan {
                            patterns: triples
                                .iter()
                                .map(|triple| -> Result<_, PlanError> {
                                    Ok(TriplePattern {
                                        subject: template_term(&triple.subject)?,
                                        predicate: template_predicate(&triple.predicate)?,
                                        object: template_term(&triple.object)?,
                                    })
                                })
                                .collect::<Result<_, PlanError>>()?,
                        })
                    }
                    GenerateElement::SubQuery(sub_query) => GenerateElementPlan::SubQuery(
                        Box::new(self.make(Arc::clone(sub_query), false)?),
                    ),
                })
            })
            .collect::<Result<_, PlanError>>()?;
        Ok(GenerateTemplatePlan { elements })
    }
}

fn compile_binding_clause(
    clause: &BindingClause,
    mode: IteratorMode,
) -> Result<BindingsClausePlan, PlanError> {
    Ok(match clause {
        BindingClause::Iterator {
            expression,
            variables,
        } => compile_iterator(expression, variables, mode)?.into(),
        BindingClause::Source {
            source,
            accept,
            variable,
        } => compile_source(source, accept.as_ref(), variable)?.into(),
        BindingClause::Bind {
            expression,
            variable,
        } => BindPlan {
            expression: expression.clone(),
            variable: variable.clone(),
        }
        .into(),
    })
}

fn compile_iterator(
    expression: &Expression,
    variables: &[Variable],
    mode: IteratorMode,
) -> Result<IteratorPlan, PlanError> {
    if variables.is_empty() {
        return Err(PlanError::malformed(
            ClauseKind::Iterator,
            "The iterator must bind at least one variable",
        ));
    }
    let Expression::FunctionCall(Function::Custom(function), arguments) = expression else {
        return Err(PlanError::malformed(
            ClauseKind::Iterator,
            format!("Iterator should be a function: <iri>(...) AS ?var1 ?var2 ... Got {expression}"),
        ));
    };
    Ok(IteratorPlan {
        mode,
        function: function.clone(),
        arguments: arguments.clone(),
        variables: variables.to_vec(),
    })
}

fn compile_source(
    source: &TermPattern,
    accept: Option<&TermPattern>,
    variable: &Variable,
) -> Result<SourcePlan, PlanError> {
    let Some(source) = named_node_pattern(source) else {
        return Err(PlanError::malformed(
            ClauseKind::Source,
            format!("The source must be a URI or a variable. Got {source}"),
        ));
    };
    let accept = match accept {
        Some(accept) => Some(named_node_pattern(accept).ok_or_else(|| {
            PlanError::malformed(
                ClauseKind::Source,
                format!("The accept must be a variable or a URI. Got {accept}"),
            )
        })?),
        None => None,
    };
    Ok(SourcePlan {
        source,
        accept,
        variable: variable.clone(),
    })
}

fn compile_select(query: &GenerateQuery) -> SelectPlan {
    let mut select = extract_select_query(query);
    if let Query::Select { pattern, .. } = &mut select {
        if has_aggregators(pattern) {
            for variable in query.signature.iter().flatten() {
                add_group_by(pattern, variable);
            }
        }
    }
    trace!("Generated SELECT query\n{select}");
    SelectPlan {
        query: select,
        is_select_type: query.is_select_type(),
        signature: query.signature.clone().unwrap_or_default(),
    }
}

fn named_node_pattern(term: &TermPattern) -> Option<NamedNodePattern> {
    match term {
        TermPattern::NamedNode(node) => Some(node.clone().into()),
        TermPattern::Variable(variable) => Some(variable.clone().into()),
        _ => None,
    }
}

fn template_term(term: &TemplateTerm) -> Result<TermPattern, PlanError> {
    match term {
        TemplateTerm::Term(term) => Ok(term.clone()),
        TemplateTerm::Expression(expression) => Err(PlanError::Internal(format!(
            "The embedded expression {expression} should have been normalized"
        ))),
    }
}

fn template_predicate(term: &TemplateTerm) -> Result<NamedNodePattern, PlanError> {
    let term = template_term(term)?;
    named_node_pattern(&term).ok_or_else(|| {
        PlanError::malformed(
            ClauseKind::GenerateTriple,
            format!("The predicate must be a URI or a variable. Got {term}"),
        )
    })
}
