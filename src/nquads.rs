use iref::IriBuf;
use locspan::Meta;
use nquads_syntax::parsing::Parse;
use oxrdf::{BlankNode, GraphName, Literal, NamedNode};
use rdf_canon::CanonicalizationOptions;
use rdf_types::{BlankIdBuf, Object, Quad, Subject};
use sha2::Sha256;

use crate::error::CanonicalizationError;

/// Canonicalizes N-Quads RDF data using URDNA2015 algorithm
///
/// Parses N-Quads format RDF statements and normalizes them to canonical form
/// using the Universal RDF Dataset Normalization Algorithm 2015 (URDNA2015).
///
/// # Arguments
/// * `nquads` - N-Quads format RDF data as a string
/// * `max_work` - Budget of N-degree hash calls for blank nodes that share a
///   first-degree hash
///
/// # Returns
/// Canonicalized N-Quads string
///
/// # Errors
/// Returns error if the input cannot be parsed as valid N-Quads or the
/// labeling exhausts `max_work`
pub fn canonicalize_nquads(nquads: &str, max_work: u64) -> Result<String, CanonicalizationError> {
    let dataset = nquads_syntax::Document::parse_str(nquads, |span| span).map_err(
        |Meta(error, span)| CanonicalizationError::InvalidNQuads {
            line: line_at(nquads, span.start()),
            reason: error.to_string(),
        },
    )?;

    let stripped_dataset = dataset
        .into_value()
        .into_iter()
        .map(Meta::into_value)
        .map(Quad::strip_all_but_predicate)
        .collect::<Vec<_>>();

    canonicalize_quads(stripped_dataset, max_work)
}

/// Canonicalizes an RDF dataset and returns the sorted N-Quads serialization.
///
/// Blank nodes are relabeled `_:c14n<N>`. Duplicate quads collapse, as in any
/// RDF dataset.
pub fn canonicalize_quads(
    quads: impl IntoIterator<Item = Quad>,
    max_work: u64,
) -> Result<String, CanonicalizationError> {
    let quads = quads.into_iter().map(oxrdf_quad).collect::<Vec<_>>();

    let options = CanonicalizationOptions {
        hndq_call_limit: Some(usize::try_from(max_work).unwrap_or(usize::MAX)),
    };

    rdf_canon::canonicalize_quads_with::<Sha256>(&quads, &options).map_err(|e| match e {
        rdf_canon::CanonicalizationError::HndqCallLimitExceeded(_) => {
            CanonicalizationError::TooComplex { budget: max_work }
        }
        other => CanonicalizationError::InvalidStructure(other.to_string()),
    })
}

fn line_at(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map_or(1, |prefix| prefix.matches('\n').count() + 1)
}

fn oxrdf_quad(Quad(subject, predicate, object, graph): Quad) -> oxrdf::Quad {
    let graph = match graph {
        Some(Subject::Iri(iri)) => GraphName::NamedNode(named_node(&iri)),
        Some(Subject::Blank(id)) => GraphName::BlankNode(blank_node(&id)),
        None => GraphName::DefaultGraph,
    };

    let object: oxrdf::Term = match object {
        Object::Iri(iri) => named_node(&iri).into(),
        Object::Blank(id) => blank_node(&id).into(),
        Object::Literal(literal) => oxrdf_literal(literal).into(),
    };

    let subject: oxrdf::Subject = match subject {
        Subject::Iri(iri) => named_node(&iri).into(),
        Subject::Blank(id) => blank_node(&id).into(),
    };

    oxrdf::Quad::new(subject, named_node(&predicate), object, graph)
}

fn oxrdf_literal(literal: rdf_types::Literal) -> Literal {
    match literal {
        rdf_types::Literal::String(value) => Literal::new_simple_literal(String::from(value)),
        rdf_types::Literal::TypedString(value, datatype) => {
            Literal::new_typed_literal(String::from(value), named_node(&datatype))
        }
        rdf_types::Literal::LangString(value, tag) => {
            Literal::new_language_tagged_literal_unchecked(String::from(value), tag.as_str())
        }
    }
}

// both parsers have already validated these
fn named_node(iri: &IriBuf) -> NamedNode {
    NamedNode::new_unchecked(iri.as_str())
}

fn blank_node(id: &BlankIdBuf) -> BlankNode {
    BlankNode::new_unchecked(id.suffix())
}
