use iref::IriBuf;
use json_ld::{
    expansion::Policy, syntax::ErrorCode, syntax::Parse, JsonLdProcessor, Options, RemoteDocument,
};
use locspan::{Meta, Span};
use log::debug;
use once_cell::sync::OnceCell;
use rdf_types::Quad;
use serde_json::Value;

use crate::{
    error::{CanonicalizationError, SealError},
    json_ld::loader::{ContextLoader, ContextResolver},
};

/// Options controlling JSON-LD to RDF expansion.
#[derive(Clone, Debug)]
pub struct ExpansionOptions {
    /// Base IRI for document-relative references.
    pub base: Option<String>,
    /// Reject properties that do not expand to an IRI instead of dropping
    /// them.
    pub strict: bool,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            base: None,
            strict: true,
        }
    }
}

/// Convert JSON-LD to N-Quads.
///
/// Contexts are loaded through `resolver`. The statements are sorted and
/// deduplicated; blank node labels are the processor's `_:b<N>` labels.
pub async fn jsonld_to_nquads(
    input: &Value,
    resolver: &ContextResolver,
    options: &ExpansionOptions,
) -> Result<String, SealError> {
    let quads = expand_to_quads(input, resolver, options).await?;

    let mut lines = quads
        .iter()
        .map(|quad| format!("{quad} .\n"))
        .collect::<Vec<_>>();
    lines.sort();
    lines.dedup();

    Ok(lines.concat())
}

/// Expands a JSON-LD document and converts it to an RDF dataset.
///
/// A context that fails to load is reported as the resolver's
/// [`ContextResolutionError`](crate::error::ContextResolutionError); any other
/// processing error is a [`CanonicalizationError`].
pub async fn expand_to_quads(
    document: &Value,
    resolver: &ContextResolver,
    options: &ExpansionOptions,
) -> Result<Vec<Quad>, SealError> {
    let input = serde_json::to_string(document)?;

    let json = json_ld::syntax::Value::parse_str(&input, |span| span)
        .map_err(|Meta(e, _)| CanonicalizationError::InvalidStructure(e.to_string()))?;

    let base = options
        .base
        .as_deref()
        .map(|base| IriBuf::new(base).map_err(|_| CanonicalizationError::InvalidIri(base.to_owned())))
        .transpose()?;

    let failure = OnceCell::new();
    let mut loader = ContextLoader::new(resolver, &failure);

    let processor_options: Options<IriBuf, Span> = Options {
        base,
        expansion_policy: if options.strict {
            Policy::Strict
        } else {
            Policy::Standard
        },
        ..Default::default()
    };

    let doc = RemoteDocument::new(None, None, json);
    let mut generator =
        rdf_types::generator::Blank::new_with_prefix("b".to_string()).with_default_metadata();

    let mut to_rdf = match doc
        .to_rdf_using(&mut generator, &mut loader, processor_options)
        .await
    {
        Ok(to_rdf) => to_rdf,
        Err(e) => {
            let code = e.code();
            debug!("JSON-LD processing failed: {code}");

            return Err(match failure.get() {
                Some(failure) => failure.clone().into(),
                None => expansion_error(code).into(),
            });
        }
    };

    // generalized RDF is off, so every predicate is an IRI
    let quads = to_rdf
        .cloned_quads()
        .filter_map(|Quad(s, p, o, g)| Some(Quad(s, p.into_iri()?, o, g)))
        .collect::<Vec<_>>();

    debug!("Expanded document to {} quads", quads.len());

    Ok(quads)
}

fn expansion_error(code: ErrorCode) -> CanonicalizationError {
    use ErrorCode::*;

    let reason = code.to_string();

    match code {
        KeyExpansionFailed => CanonicalizationError::UnresolvableTerm(reason),
        CyclicIriMapping => CanonicalizationError::CyclicTermDefinition(reason),
        InvalidBaseIri | InvalidIdValue | InvalidIriMapping | InvalidVocabMapping
        | IriConfusedWithPrefix => CanonicalizationError::InvalidIri(reason),
        InvalidJsonLiteral
        | InvalidLanguageTaggedString
        | InvalidLanguageTaggedValue
        | InvalidTypedValue
        | InvalidValueObject
        | InvalidValueObjectValue
        | InvalidBaseDirection => CanonicalizationError::MalformedLiteral(reason),
        ContextOverflow
        | InvalidContextEntry
        | InvalidContextNullification
        | InvalidLocalContext
        | InvalidRemoteContext
        | InvalidScopedContext
        | InvalidTermDefinition
        | InvalidContainerMapping
        | InvalidTypeMapping
        | InvalidKeywordAlias
        | InvalidDefaultLanguage
        | InvalidLanguageMapping
        | InvalidImportValue
        | InvalidPrefixValue
        | InvalidPropagateValue
        | InvalidProtectedValue
        | InvalidVersionValue
        | InvalidReverseProperty
        | KeywordRedefinition
        | ProtectedTermRedefinition
        | LoadingRemoteContextFailed
        | ProcessingModeConflict => CanonicalizationError::InvalidContext(reason),
        _ => CanonicalizationError::InvalidStructure(reason),
    }
}
