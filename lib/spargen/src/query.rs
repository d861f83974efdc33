use oxiri::Iri;
use oxrdf::{NamedNode, Variable};
use rand::random;
use spargebra::algebra::{Expression, GraphPattern, QueryDataset};
use spargebra::term::{NamedNodePattern, TermPattern};
use std::fmt;
use std::mem::replace;
use std::sync::Arc;

/// A parsed [SPARQL-Generate](https://ci.mines-stetienne.fr/sparql-generate/) query.
///
/// It extends a SPARQL query with binding clauses (`ITERATOR`, `SOURCE` and `BIND`)
/// evaluated before the `WHERE` clause and with an output form that is either a
/// `GENERATE` template or a call to a named sub-query.
///
/// ```
/// use oxrdf::{NamedNode, Variable};
/// use spargebra::algebra::{Expression, Function};
/// use spargen::{BindingClause, GenerateQuery, QueryForm};
///
/// let mut query = GenerateQuery::new(QueryForm::Select);
/// query.binding_clauses.push(BindingClause::Iterator {
///     expression: Expression::FunctionCall(
///         Function::Custom(NamedNode::new("http://example.com/split")?),
///         vec![Expression::Literal("a,b".into()), Expression::Literal(",".into())],
///     ),
///     variables: vec![Variable::new("x")?],
/// });
/// assert_eq!(
///     query.to_string(),
///     "SELECT *\nITERATOR <http://example.com/split>(\"a,b\", \",\") AS ?x\nWHERE {  }"
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GenerateQuery {
    /// The query base IRI.
    pub base_iri: Option<Iri<String>>,
    /// The [query dataset specification](https://www.w3.org/TR/sparql11-query/#specifyingDataset).
    pub dataset: Option<QueryDataset>,
    /// The output form of the query.
    pub form: QueryForm,
    /// The IRI identifying this query when it defines a named sub-query.
    pub name: Option<NamedNode>,
    /// The formal parameters of the named sub-query defined by this query.
    pub signature: Option<Vec<Variable>>,
    /// The `ITERATOR`, `SOURCE` and `BIND` clauses, in declaration order.
    pub binding_clauses: Vec<BindingClause>,
    /// The `WHERE` clause together with its solution modifiers.
    ///
    /// When the query has solution modifiers, the pattern starts with the query's own projection,
    /// as [`SparqlParser`](spargebra::SparqlParser) builds it for `SELECT` queries: a projection
    /// found below that one belongs to a sub-select.
    pub pattern: GraphPattern,
}

impl GenerateQuery {
    /// Builds a query with the given output form, no binding clause and an empty `WHERE` clause.
    pub fn new(form: QueryForm) -> Self {
        Self {
            base_iri: None,
            dataset: None,
            form,
            name: None,
            signature: None,
            binding_clauses: Vec::new(),
            pattern: GraphPattern::Bgp {
                patterns: Vec::new(),
            },
        }
    }

    #[inline]
    pub fn is_select_type(&self) -> bool {
        matches!(self.form, QueryForm::Select)
    }

    #[inline]
    pub fn is_template_type(&self) -> bool {
        matches!(self.form, QueryForm::Template)
    }

    #[inline]
    pub fn is_named_sub_query(&self) -> bool {
        matches!(self.form, QueryForm::NamedSubQuery { .. })
    }

    #[inline]
    pub fn has_generate_clause(&self) -> bool {
        matches!(self.form, QueryForm::Generate(_))
    }

    /// The `GENERATE` clause elements, if the query has one.
    pub fn generate_clause(&self) -> Option<&[GenerateElement]> {
        if let QueryForm::Generate(elements) = &self.form {
            Some(elements)
        } else {
            None
        }
    }

    #[inline]
    pub fn has_embedded_expressions(&self) -> bool {
        self.embedded_expression_count() > 0
    }

    /// Number of expressions embedded in the triples of this query's `GENERATE` clause.
    ///
    /// Nested sub-queries are not counted: they are normalized on their own.
    pub fn embedded_expression_count(&self) -> usize {
        self.generate_clause()
            .into_iter()
            .flatten()
            .filter_map(|element| match element {
                GenerateElement::Triples(triples) => Some(triples),
                GenerateElement::SubQuery(_) => None,
            })
            .flatten()
            .map(TemplateTriple::embedded_expression_count)
            .sum()
    }

    /// Lifts the expressions embedded in the `GENERATE` triples out of the template.
    ///
    /// Each embedded expression is replaced by a fresh variable, bound by an `Extend`
    /// evaluated after the `WHERE` clause and its solution modifiers.
    pub fn normalize(&mut self) {
        let QueryForm::Generate(elements) = &mut self.form else {
            return;
        };
        let mut lifted = Vec::new();
        for element in elements {
            if let GenerateElement::Triples(triples) = element {
                for triple in triples {
                    for term in [
                        &mut triple.subject,
                        &mut triple.predicate,
                        &mut triple.object,
                    ] {
                        lift_expression(term, &mut lifted);
                    }
                }
            }
        }
        for (variable, expression) in lifted {
            let inner = replace(
                &mut self.pattern,
                GraphPattern::Bgp {
                    patterns: Vec::new(),
                },
            );
            self.pattern = GraphPattern::Extend {
                inner: Box::new(inner),
                variable,
                expression,
            };
        }
    }

    fn fmt_identity(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if let Some(signature) = &self.signature {
            f.write_str("(")?;
            for (i, variable) in signature.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{variable}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }

    /// Writes the query without its prologue, the way it appears nested in a `GENERATE` clause.
    fn fmt_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.form {
            QueryForm::Select => f.write_str("SELECT *")?,
            // The template body is not part of the model
            QueryForm::Template => {
                f.write_str("TEMPLATE")?;
                self.fmt_identity(f)?;
                f.write_str(" { }")?;
            }
            QueryForm::Generate(elements) => {
                f.write_str("GENERATE")?;
                self.fmt_identity(f)?;
                f.write_str(" {")?;
                for element in elements {
                    write!(f, " {element}")?;
                }
                f.write_str(" }")?;
            }
            QueryForm::NamedSubQuery { name, parameters } => {
                write!(f, "GENERATE {name}(")?;
                fmt_expressions(f, parameters)?;
                f.write_str(")")?;
            }
        }
        if let Some(dataset) = &self.dataset {
            write!(f, "{dataset}")?;
        }
        for clause in &self.binding_clauses {
            write!(f, "\n{clause}")?;
        }
        write!(f, "\nWHERE {{ {} }}", self.pattern)
    }
}

impl fmt::Display for GenerateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(base_iri) = &self.base_iri {
            writeln!(f, "BASE <{}>", base_iri.as_str())?;
        }
        self.fmt_body(f)
    }
}

/// The output form of a [`GenerateQuery`].
///
/// The variants are mutually exclusive: they decide which output plan is compiled.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum QueryForm {
    /// A SPARQL-Generate `SELECT` query.
    Select,
    /// A SPARQL-Template `TEMPLATE` query.
    Template,
    /// A `GENERATE { ... }` template.
    Generate(Vec<GenerateElement>),
    /// A `GENERATE <name>(...)` call to a named sub-query.
    NamedSubQuery {
        name: NamedNodePattern,
        parameters: Vec<Expression>,
    },
}

/// A clause binding variables before the evaluation of the `WHERE` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum BindingClause {
    /// `ITERATOR <function>(args...) AS ?v1 ?v2 ...`
    Iterator {
        expression: Expression,
        variables: Vec<Variable>,
    },
    /// `SOURCE <locator> ACCEPT <media type> AS ?v`
    Source {
        source: TermPattern,
        accept: Option<TermPattern>,
        variable: Variable,
    },
    /// `BIND(expression AS ?v)`
    Bind {
        expression: Expression,
        variable: Variable,
    },
}

impl fmt::Display for BindingClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iterator {
                expression,
                variables,
            } => {
                write!(f, "ITERATOR {expression} AS")?;
                for variable in variables {
                    write!(f, " {variable}")?;
                }
                Ok(())
            }
            Self::Source {
                source,
                accept,
                variable,
            } => {
                write!(f, "SOURCE {source}")?;
                if let Some(accept) = accept {
                    write!(f, " ACCEPT {accept}")?;
                }
                write!(f, " AS {variable}")
            }
            Self::Bind {
                expression,
                variable,
            } => write!(f, "BIND({expression} AS {variable})"),
        }
    }
}

/// An element of a `GENERATE` clause.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GenerateElement {
    /// A block of triples to instantiate
    Triples(Vec<TemplateTriple>),
    /// A nested `GENERATE` query
    SubQuery(Arc<GenerateQuery>),
}

impl fmt::Display for GenerateElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triples(triples) => {
                for (i, triple) in triples.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{triple} .")?;
                }
                Ok(())
            }
            Self::SubQuery(query) => {
                query.fmt_body(f)?;
                f.write_str(" .")
            }
        }
    }
}

/// A triple of a `GENERATE` template.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TemplateTriple {
    pub subject: TemplateTerm,
    pub predicate: TemplateTerm,
    pub object: TemplateTerm,
}

impl TemplateTriple {
    pub fn new(
        subject: impl Into<TemplateTerm>,
        predicate: impl Into<TemplateTerm>,
        object: impl Into<TemplateTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    fn embedded_expression_count(&self) -> usize {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter(|term| matches!(term, TemplateTerm::Expression(_)))
            .count()
    }
}

impl fmt::Display for TemplateTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A position of a [`TemplateTriple`]: either a plain term pattern or an embedded expression.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum TemplateTerm {
    Term(TermPattern),
    Expression(Expression),
}

impl fmt::Display for TemplateTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(term) => write!(f, "{term}"),
            Self::Expression(expression) => write!(f, "{{ {expression} }}"),
        }
    }
}

impl From<TermPattern> for TemplateTerm {
    #[inline]
    fn from(term: TermPattern) -> Self {
        Self::Term(term)
    }
}

impl From<NamedNode> for TemplateTerm {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Term(node.into())
    }
}

impl From<Variable> for TemplateTerm {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Term(variable.into())
    }
}

impl From<Expression> for TemplateTerm {
    #[inline]
    fn from(expression: Expression) -> Self {
        Self::Expression(expression)
    }
}

fn lift_expression(term: &mut TemplateTerm, lifted: &mut Vec<(Variable, Expression)>) {
    if !matches!(term, TemplateTerm::Expression(_)) {
        return;
    }
    let variable = new_var();
    if let TemplateTerm::Expression(expression) =
        replace(term, TemplateTerm::Term(variable.clone().into()))
    {
        lifted.push((variable, expression));
    }
}

pub(crate) fn fmt_expressions(f: &mut impl fmt::Write, expressions: &[Expression]) -> fmt::Result {
    for (i, expression) in expressions.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{expression}")?;
    }
    Ok(())
}

fn new_var() -> Variable {
    Variable::new_unchecked(format!("{:x}", random::<u128>()))
}
