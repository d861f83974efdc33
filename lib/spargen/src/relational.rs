//! Extraction of the plain SPARQL `SELECT` query equivalent to a SPARQL-Generate query.

use crate::query::GenerateQuery;
use oxrdf::Variable;
use spargebra::Query;
use spargebra::algebra::GraphPattern;

/// Builds the `SELECT` query evaluated by the underlying SPARQL engine.
///
/// The `GENERATE` clause and the binding clauses are left out: only the `WHERE` clause,
/// its solution modifiers and the dataset are kept.
pub fn extract_select_query(query: &GenerateQuery) -> Query {
    Query::Select {
        dataset: query.dataset.clone(),
        pattern: query.pattern.clone(),
        base_iri: query.base_iri.clone(),
    }
}

/// Checks if the `GROUP BY` of the query computes aggregates.
///
/// Only the group of the query itself is considered: the walk stops at the projection below the
/// query's own one, which belongs to a sub-select.
pub fn has_aggregators(pattern: &GraphPattern) -> bool {
    has_own_aggregators(pattern, false)
}

fn has_own_aggregators(pattern: &GraphPattern, projected: bool) -> bool {
    match pattern {
        GraphPattern::Group { aggregates, .. } => !aggregates.is_empty(),
        GraphPattern::Project { inner, .. } if !projected => has_own_aggregators(inner, true),
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Filter { inner, .. }
        | GraphPattern::Extend { inner, .. } => has_own_aggregators(inner, projected),
        _ => false,
    }
}

/// Adds `variable` to the keys of the query `GROUP BY` and to the projection above it.
///
/// Returns `false` if the query has no `GROUP BY` of its own. Sub-selects are left untouched.
pub fn add_group_by(pattern: &mut GraphPattern, variable: &Variable) -> bool {
    add_own_group_by(pattern, variable, false)
}

fn add_own_group_by(pattern: &mut GraphPattern, variable: &Variable, projected: bool) -> bool {
    match pattern {
        GraphPattern::Group { variables, .. } => {
            push_if_absent(variables, variable);
            true
        }
        GraphPattern::Project { inner, variables } if !projected => {
            let found = add_own_group_by(inner, variable, true);
            if found {
                push_if_absent(variables, variable);
            }
            found
        }
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Filter { inner, .. }
        | GraphPattern::Extend { inner, .. } => add_own_group_by(inner, variable, projected),
        _ => false,
    }
}

fn push_if_absent(variables: &mut Vec<Variable>, variable: &Variable) {
    if !variables.contains(variable) {
        variables.push(variable.clone());
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use spargebra::SparqlParser;
    use spargebra::SparqlSyntaxError;

    fn parse_pattern(query: &str) -> Result<GraphPattern, SparqlSyntaxError> {
        match SparqlParser::new().parse_query(query)? {
            Query::Select { pattern, .. } => Ok(pattern),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_has_aggregators() -> Result<(), SparqlSyntaxError> {
        assert!(has_aggregators(&parse_pattern(
            "SELECT ?p (COUNT(?s) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?p ORDER BY ?c LIMIT 10"
        )?));
        assert!(!has_aggregators(&parse_pattern(
            "SELECT ?p WHERE { ?s ?p ?o } GROUP BY ?p"
        )?));
        assert!(!has_aggregators(&parse_pattern(
            "SELECT * WHERE { { SELECT (COUNT(*) AS ?c) WHERE { ?s ?p ?o } } ?x ?y ?c }"
        )?));
        Ok(())
    }

    #[test]
    fn test_add_group_by() -> Result<(), SparqlSyntaxError> {
        let mut pattern =
            parse_pattern("SELECT (COUNT(?s) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?p")?;
        let p = Variable::new_unchecked("p");
        let o = Variable::new_unchecked("o");
        assert!(add_group_by(&mut pattern, &o));
        assert!(add_group_by(&mut pattern, &p));
        let GraphPattern::Project { inner, variables } = &pattern else {
            unreachable!()
        };
        assert!(variables.contains(&o));
        assert!(variables.contains(&p));
        let mut inner = inner.as_ref();
        while let GraphPattern::Extend { inner: i, .. } = inner {
            inner = i;
        }
        let GraphPattern::Group { variables, .. } = inner else {
            unreachable!()
        };
        assert_eq!(variables, &[p, o]);
        Ok(())
    }

    #[test]
    fn test_sub_select_aggregates_are_not_the_query_ones() -> Result<(), SparqlSyntaxError> {
        let mut pattern = parse_pattern(
            "SELECT * WHERE { { SELECT (COUNT(?s) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?p } }",
        )?;
        let before = pattern.clone();
        assert!(!has_aggregators(&pattern));
        assert!(!add_group_by(&mut pattern, &Variable::new_unchecked("p")));
        assert_eq!(pattern, before);
        Ok(())
    }

    #[test]
    fn test_add_group_by_without_group() -> Result<(), SparqlSyntaxError> {
        let mut pattern = parse_pattern("SELECT ?s WHERE { ?s ?p ?o }")?;
        let before = pattern.clone();
        assert!(!add_group_by(&mut pattern, &Variable::new_unchecked("p")));
        assert_eq!(pattern, before);
        Ok(())
    }
}
