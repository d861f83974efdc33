#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]

mod compiler;
mod error;
mod parser;
pub mod plan;
mod query;
pub mod relational;
mod registry;

pub use crate::compiler::PlanCompiler;
pub use crate::error::{ClauseKind, PlanError};
pub use crate::parser::QueryParser;
pub use crate::plan::{
    BindPlan, BindingsClausePlan, GenerateElementPlan, GenerateTemplatePlan, GenerateTriplesPlan,
    IteratorMode, IteratorPlan, NamedSubQueryPlan, OutputFormPlan, RootPlan, SelectPlan,
    SourcePlan,
};
pub use crate::query::{
    BindingClause, GenerateElement, GenerateQuery, QueryForm, TemplateTerm, TemplateTriple,
};
pub use crate::registry::SubQueryRegistry;
