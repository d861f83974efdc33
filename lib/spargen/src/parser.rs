use crate::error::PlanError;
use crate::query::GenerateQuery;
use oxiri::Iri;
use std::error::Error;

/// Parser of the SPARQL-Generate syntax.
///
/// Should be given to [`PlanCompiler::with_parser`](crate::PlanCompiler::with_parser)
/// so that queries with embedded expressions are normalized through a serialization and parsing round-trip,
/// and to allow [`PlanCompiler::compile_str`](crate::PlanCompiler::compile_str).
///
/// ```
/// use oxiri::Iri;
/// use spargen::{GenerateQuery, PlanCompiler, QueryForm, QueryParser};
/// use std::convert::Infallible;
///
/// struct SelectAllParser;
///
/// impl QueryParser for SelectAllParser {
///     type Error = Infallible;
///
///     fn parse_query(
///         &self,
///         _query: &str,
///         _base_iri: Option<&Iri<String>>,
///     ) -> Result<GenerateQuery, Self::Error> {
///         Ok(GenerateQuery::new(QueryForm::Select))
///     }
///
///     fn parse_sub_query(
///         &self,
///         _parent: &GenerateQuery,
///         _query: &str,
///     ) -> Result<GenerateQuery, Self::Error> {
///         Ok(GenerateQuery::new(QueryForm::Select))
///     }
/// }
///
/// let plan = PlanCompiler::new()
///     .with_parser(SelectAllParser)
///     .compile_str("SELECT * WHERE {}")?;
/// assert!(plan.select.is_select_type);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait QueryParser: Send + Sync {
    /// The parsing error.
    type Error: Error + Send + Sync + 'static;

    /// Parses a standalone query.
    fn parse_query(
        &self,
        query: &str,
        base_iri: Option<&Iri<String>>,
    ) -> Result<GenerateQuery, Self::Error>;

    /// Parses a sub-query, in the context of the query it belongs to.
    ///
    /// Used for named sub-queries and for queries declaring a signature without a name.
    fn parse_sub_query(
        &self,
        parent: &GenerateQuery,
        query: &str,
    ) -> Result<GenerateQuery, Self::Error>;
}

pub(crate) struct ErrorConversionQueryParser<P>(pub P);

impl<P: QueryParser> QueryParser for ErrorConversionQueryParser<P> {
    type Error = PlanError;

    fn parse_query(
        &self,
        query: &str,
        base_iri: Option<&Iri<String>>,
    ) -> Result<GenerateQuery, PlanError> {
        self.0
            .parse_query(query, base_iri)
            .map_err(|e| wrap_parse_error(query, e))
    }

    fn parse_sub_query(
        &self,
        parent: &GenerateQuery,
        query: &str,
    ) -> Result<GenerateQuery, PlanError> {
        self.0
            .parse_sub_query(parent, query)
            .map_err(|e| wrap_parse_error(query, e))
    }
}

fn wrap_parse_error(query: &str, error: impl Error + Send + Sync + 'static) -> PlanError {
    let error: Box<dyn Error + Send + Sync> = Box::new(error);
    match error.downcast() {
        Ok(error) => *error,
        Err(error) => PlanError::Parse {
            query: query.to_owned(),
            error,
        },
    }
}
